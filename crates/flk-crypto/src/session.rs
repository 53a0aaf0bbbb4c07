//! AES-256-GCM sealing of secrets at rest
//!
//! Sealed envelope format (binary, big-endian lengths):
//! ```text
//! ivLen(4) iv(12) saltLen(4) salt(16) cipherLen(4) ciphertext || tag(16)
//! ```
//!
//! The key is re-derived from the caller's secret and the stored salt on every
//! open, so the envelope is self-contained apart from that secret.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use flk_core::wire::{put_len_prefixed, WireReader};
use flk_core::{FlkError, FlkResult};

use crate::kdf::{derive_key, generate_salt, KdfParams, SessionKey};
use crate::{IV_SIZE, SALT_SIZE, TAG_SIZE};

/// Ciphertext plus the public parameters needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub iv: [u8; IV_SIZE],
    pub salt: [u8; SALT_SIZE],
    /// AES-GCM output: ciphertext followed by the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Append the length-prefixed envelope to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> FlkResult<()> {
        put_len_prefixed(out, &self.iv)?;
        put_len_prefixed(out, &self.salt)?;
        put_len_prefixed(out, &self.ciphertext)
    }

    pub fn to_bytes(&self) -> FlkResult<Vec<u8>> {
        let mut out = Vec::with_capacity(12 + IV_SIZE + SALT_SIZE + self.ciphertext.len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Read one envelope from the current reader position.
    pub fn read_from(reader: &mut WireReader<'_>) -> FlkResult<Self> {
        let iv_bytes = reader.read_len_prefixed("iv")?;
        let iv: [u8; IV_SIZE] = iv_bytes.try_into().map_err(|_| {
            FlkError::Deserialization(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv_bytes.len()
            ))
        })?;
        let salt_bytes = reader.read_len_prefixed("salt")?;
        let salt: [u8; SALT_SIZE] = salt_bytes.try_into().map_err(|_| {
            FlkError::Deserialization(format!(
                "salt must be {SALT_SIZE} bytes, got {}",
                salt_bytes.len()
            ))
        })?;
        let ciphertext = reader.read_len_prefixed("cipher")?;
        if ciphertext.len() < TAG_SIZE {
            return Err(FlkError::Deserialization(format!(
                "cipher too short: {} bytes (minimum {TAG_SIZE})",
                ciphertext.len()
            )));
        }
        Ok(Self {
            iv,
            salt,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn from_bytes(data: &[u8]) -> FlkResult<Self> {
        let mut reader = WireReader::new(data);
        let sealed = Self::read_from(&mut reader)?;
        reader.finish("sealed envelope")?;
        Ok(sealed)
    }
}

/// Stateless sealing service; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoSession {
    params: KdfParams,
}

impl CryptoSession {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// PBKDF2-HMAC-SHA256(secret, salt) → 256-bit key.
    pub fn derive_key(&self, secret: &[u8], salt: &[u8; SALT_SIZE]) -> SessionKey {
        derive_key(secret, salt, &self.params)
    }

    /// Encrypt `plaintext` under a key derived from `secret` with a fresh salt and iv.
    pub fn seal(&self, plaintext: &[u8], secret: &[u8]) -> FlkResult<SealedBox> {
        let salt = generate_salt();
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(secret, &salt);
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| FlkError::Other(anyhow::anyhow!("AES-256-GCM seal failed: {e}")))?;

        Ok(SealedBox {
            iv,
            salt,
            ciphertext,
        })
    }

    /// Decrypt a sealed box. Any tag mismatch fails closed with `FlkError::Integrity`;
    /// no partial plaintext is ever returned.
    pub fn open(&self, sealed: &SealedBox, secret: &[u8]) -> FlkResult<Vec<u8>> {
        let key = self.derive_key(secret, &sealed.salt);
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        cipher
            .decrypt(Nonce::from_slice(&sealed.iv), sealed.ciphertext.as_ref())
            .map_err(|_| {
                FlkError::Integrity("AES-256-GCM open failed: wrong secret or tampered data".into())
            })
    }
}
