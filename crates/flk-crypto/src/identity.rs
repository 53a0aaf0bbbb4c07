//! Seed-phrase identities: deterministic Ed25519 keys and account ids
//!
//! The signing key is expanded from the BIP-39 seed with HKDF rather than by
//! seeding a general-purpose RNG, so the same phrase always yields the same
//! key on every platform.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use flk_core::{FlkError, FlkResult};

use crate::phrase::SeedPhrase;
use crate::KEY_SIZE;

/// HKDF info string for the identity signing key
const IDENTITY_INFO: &[u8] = b"fractalock-identity-ed25519-v1";

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410), followed by the 32 raw key bytes
const SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Encoded SubjectPublicKeyInfo length
pub const SPKI_SIZE: usize = SPKI_PREFIX.len() + 32;

/// Bytes of SHA-256 kept for the account id
const USER_ID_BYTES: usize = 16;

/// Private signing key plus the account id derived from its public half.
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    user_id: String,
}

impl IdentityKeyPair {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let user_id = user_id_for(&signing_key.verifying_key());
        Self {
            signing_key,
            user_id,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        encode_public_key(&self.verifying_key())
    }

    /// What the account store keeps: id and public key, nothing secret.
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            user_id: self.user_id.clone(),
            public_key: self.public_key_base64(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("user_id", &self.user_id)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Registration record handed to the account store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub user_id: String,
    /// Base64 (standard alphabet) of the SubjectPublicKeyInfo DER encoding
    pub public_key: String,
}

impl PublicIdentity {
    /// Rebuild from a base64 public key, recomputing the account id.
    pub fn from_public_key_base64(public_key: &str) -> FlkResult<Self> {
        let key = decode_public_key(public_key)?;
        Ok(Self {
            user_id: user_id_for(&key),
            public_key: encode_public_key(&key),
        })
    }

    pub fn verifying_key(&self) -> FlkResult<VerifyingKey> {
        decode_public_key(&self.public_key)
    }

    /// True when `user_id` really is the digest of `public_key`.
    pub fn is_consistent(&self) -> bool {
        self.verifying_key()
            .map(|key| user_id_for(&key) == self.user_id)
            .unwrap_or(false)
    }
}

/// Derive the identity for a seed phrase.
///
/// `BIP-39 seed[..32] → HKDF-SHA256 → Ed25519 signing key`
pub fn derive_key_pair(phrase: &SeedPhrase) -> FlkResult<IdentityKeyPair> {
    let mut seed = phrase.to_seed();
    let hk = Hkdf::<Sha256>::new(None, &seed[..KEY_SIZE]);
    seed.zeroize();

    let mut okm = [0u8; KEY_SIZE];
    hk.expand(IDENTITY_INFO, &mut okm)
        .map_err(|e| FlkError::Other(anyhow::anyhow!("HKDF expand failed: {e}")))?;

    let signing_key = SigningKey::from_bytes(&okm);
    okm.zeroize();

    Ok(IdentityKeyPair::from_signing_key(signing_key))
}

pub fn sign(nonce: &[u8], key_pair: &IdentityKeyPair) -> Signature {
    key_pair.sign(nonce)
}

pub fn verify(nonce: &[u8], signature: &Signature, public_key: &VerifyingKey) -> bool {
    public_key.verify(nonce, signature).is_ok()
}

/// `base64url(SHA-256(SPKI(key))[..16])`, unpadded.
pub fn user_id_for(public_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(spki_der(public_key));
    URL_SAFE_NO_PAD.encode(&digest[..USER_ID_BYTES])
}

pub fn spki_der(public_key: &VerifyingKey) -> [u8; SPKI_SIZE] {
    let mut out = [0u8; SPKI_SIZE];
    out[..SPKI_PREFIX.len()].copy_from_slice(&SPKI_PREFIX);
    out[SPKI_PREFIX.len()..].copy_from_slice(public_key.as_bytes());
    out
}

pub fn encode_public_key(public_key: &VerifyingKey) -> String {
    STANDARD.encode(spki_der(public_key))
}

/// Accepts either the SPKI DER form or the raw 32-byte key.
pub fn decode_public_key(encoded: &str) -> FlkResult<VerifyingKey> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| FlkError::Validation(format!("public key is not base64: {e}")))?;

    let raw: &[u8] = match bytes.len() {
        SPKI_SIZE if bytes.starts_with(&SPKI_PREFIX) => &bytes[SPKI_PREFIX.len()..],
        32 => &bytes,
        n => {
            return Err(FlkError::Validation(format!(
                "public key must be {SPKI_SIZE}-byte SPKI or 32 raw bytes, got {n}"
            )))
        }
    };

    let mut key = [0u8; 32];
    key.copy_from_slice(raw);
    VerifyingKey::from_bytes(&key)
        .map_err(|e| FlkError::Validation(format!("invalid Ed25519 public key: {e}")))
}

pub fn encode_signature(signature: &Signature) -> String {
    STANDARD.encode(signature.to_bytes())
}

pub fn decode_signature(encoded: &str) -> FlkResult<Signature> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| FlkError::Validation(format!("signature is not base64: {e}")))?;
    Signature::from_slice(&bytes)
        .map_err(|e| FlkError::Validation(format!("invalid Ed25519 signature: {e}")))
}
