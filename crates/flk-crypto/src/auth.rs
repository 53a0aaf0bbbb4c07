//! Signed-nonce login handshake
//!
//! ```text
//! client                          server
//!   start_login(user_id)  ──────▶  issue nonce (TTL, keyed by user id)
//!                         ◀──────  base64(nonce)
//!   sign(nonce, key)
//!   finish_login(id, sig) ──────▶  take nonce (consumed whatever happens next)
//!                                  look up public key, verify signature
//!                         ◀──────  access token | unauthorized
//! ```
//!
//! A nonce is issued for unknown user ids too, so `start_login` does not
//! reveal which accounts exist.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use tracing::{info, warn};

use flk_core::config::AuthConfig;
use flk_core::{AuthRejection, FlkError, FlkResult};

use crate::challenge::NonceStore;
use crate::identity::{decode_signature, verify, PublicIdentity};

/// userId → public key lookup backing the handshake.
pub trait AccountDirectory: Send + Sync {
    fn public_key(&self, user_id: &str) -> Option<VerifyingKey>;

    fn register(&self, identity: &PublicIdentity) -> FlkResult<()>;
}

/// Process-local directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    keys: RwLock<HashMap<String, VerifyingKey>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AccountDirectory for InMemoryDirectory {
    fn public_key(&self, user_id: &str) -> Option<VerifyingKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
    }

    fn register(&self, identity: &PublicIdentity) -> FlkResult<()> {
        let key = identity.verifying_key()?;
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.user_id.clone(), key);
        Ok(())
    }
}

/// Opaque bearer token for an authenticated user.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub user_id: String,
    pub token: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Mints tokens once a signature has verified.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: &str) -> FlkResult<AccessToken>;
}

/// 256-bit random tokens, unpadded url-safe base64.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn issue(&self, user_id: &str) -> FlkResult<AccessToken> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Ok(AccessToken {
            user_id: user_id.to_string(),
            token: URL_SAFE_NO_PAD.encode(bytes),
        })
    }
}

pub struct LoginService<D = InMemoryDirectory, T = RandomTokenIssuer> {
    directory: D,
    issuer: T,
    nonces: NonceStore,
}

impl LoginService<InMemoryDirectory, RandomTokenIssuer> {
    /// In-memory directory and random tokens with the configured nonce TTL.
    pub fn in_memory(config: &AuthConfig) -> Self {
        Self::new(
            InMemoryDirectory::new(),
            RandomTokenIssuer,
            Duration::from_secs(config.nonce_ttl_secs),
        )
    }
}

impl<D: AccountDirectory, T: TokenIssuer> LoginService<D, T> {
    pub fn new(directory: D, issuer: T, nonce_ttl: Duration) -> Self {
        Self {
            directory,
            issuer,
            nonces: NonceStore::new(nonce_ttl),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Store a registration. The user id must be the digest of the key.
    pub fn register(&self, identity: &PublicIdentity) -> FlkResult<()> {
        if !identity.is_consistent() {
            return Err(FlkError::Validation(
                "user id does not match public key".into(),
            ));
        }
        self.directory.register(identity)?;
        info!(user_id = %identity.user_id, "identity registered");
        Ok(())
    }

    /// Issue a challenge nonce, base64 encoded.
    pub fn start_login(&self, user_id: &str) -> String {
        STANDARD.encode(self.nonces.issue(user_id))
    }

    /// Verify a base64 signature over the outstanding nonce.
    ///
    /// The nonce is consumed before anything else is checked.
    pub fn finish_login(&self, user_id: &str, signature_b64: &str) -> FlkResult<AccessToken> {
        let nonce = self
            .nonces
            .take(user_id)
            .map_err(|reason| reject(user_id, reason))?;

        let key = self
            .directory
            .public_key(user_id)
            .ok_or_else(|| reject(user_id, AuthRejection::UnknownUser))?;

        let signature = decode_signature(signature_b64)
            .map_err(|_| reject(user_id, AuthRejection::MalformedRequest))?;

        if !verify(&nonce, &signature, &key) {
            return Err(reject(user_id, AuthRejection::BadSignature));
        }

        let token = self.issuer.issue(user_id)?;
        info!(user_id, "login authenticated");
        Ok(token)
    }

    pub fn evict_expired(&self) -> usize {
        self.nonces.evict_expired()
    }
}

fn reject(user_id: &str, reason: AuthRejection) -> FlkError {
    warn!(user_id, reason = reason.as_str(), "login rejected");
    FlkError::AuthRejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_key_pair, encode_signature};
    use crate::phrase::generate_phrase;

    fn service() -> LoginService {
        LoginService::new(
            InMemoryDirectory::new(),
            RandomTokenIssuer,
            Duration::from_secs(15),
        )
    }

    #[test]
    fn test_register_rejects_mismatched_id() {
        let kp = derive_key_pair(&generate_phrase().unwrap()).unwrap();
        let mut public = kp.public_identity();
        public.user_id = "not-the-digest".into();
        assert!(service().register(&public).unwrap_err().is_validation());
    }

    #[test]
    fn test_unknown_user_still_gets_nonce() {
        let svc = service();
        let nonce = svc.start_login("ghost");
        assert_eq!(STANDARD.decode(nonce).unwrap().len(), crate::NONCE_SIZE);

        let err = svc.finish_login("ghost", "AAAA").unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthRejection::UnknownUser));
        assert_eq!(err.to_string(), "unauthorized");
    }

    #[test]
    fn test_malformed_signature_consumes_nonce() {
        let svc = service();
        let kp = derive_key_pair(&generate_phrase().unwrap()).unwrap();
        svc.register(&kp.public_identity()).unwrap();

        let nonce = STANDARD.decode(svc.start_login(kp.user_id())).unwrap();
        let err = svc.finish_login(kp.user_id(), "%%%").unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthRejection::MalformedRequest));

        // The correct signature is now too late
        let sig = encode_signature(&kp.sign(&nonce));
        let err = svc.finish_login(kp.user_id(), &sig).unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthRejection::NonceMissing));
    }

    #[test]
    fn test_token_debug_redacts() {
        let token = RandomTokenIssuer.issue("alice").unwrap();
        assert_eq!(token.token.len(), 43);
        assert!(!format!("{token:?}").contains(&token.token));
    }
}
