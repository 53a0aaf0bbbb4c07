//! Key derivation: secret + salt → 256-bit AES key via PBKDF2-HMAC-SHA256

use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// Root secret of one encryption operation.
///
/// Drives the block shuffle and, optionally, the at-rest key. Lives only in
/// memory and is zeroized on drop.
#[derive(Clone)]
pub struct MasterSeed {
    bytes: [u8; KEY_SIZE],
}

impl MasterSeed {
    /// Fresh seed from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterSeed {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSeed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A derived AES-256 key. Zeroized on drop.
pub struct SessionKey {
    bytes: [u8; KEY_SIZE],
}

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// HMAC-SHA256 rounds (default: 65536)
    pub iterations: u32,
}

impl KdfParams {
    pub const DEFAULT_ITERATIONS: u32 = 65_536;
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
        }
    }
}

impl From<&flk_core::config::KdfConfig> for KdfParams {
    fn from(config: &flk_core::config::KdfConfig) -> Self {
        Self {
            iterations: config.pbkdf2_iterations,
        }
    }
}

/// Derive a 256-bit key from `secret` and `salt` with PBKDF2-HMAC-SHA256.
///
/// The salt does not need to be secret; it travels next to the ciphertext.
pub fn derive_key(secret: &[u8], salt: &[u8; SALT_SIZE], params: &KdfParams) -> SessionKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut bytes);
    SessionKey { bytes }
}

/// Random PBKDF2 salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
