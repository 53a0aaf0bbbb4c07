//! flk-crypto: the cryptographic side of fractalock
//!
//! At-rest protection:
//! ```text
//! secret (master seed or passphrase)
//!   └── PBKDF2-HMAC-SHA256(secret, random 16-byte salt, 65536 rounds) → 256-bit key
//!         └── AES-256-GCM(key, random 12-byte iv) → ciphertext || 128-bit tag
//! ```
//!
//! Identity:
//! ```text
//! 12-word BIP-39 phrase
//!   └── BIP-39 seed (64 bytes, empty passphrase)
//!         └── first 32 bytes → HKDF-SHA256("fractalock-identity-ed25519-v1") → Ed25519 key
//!               └── userId = base64url(SHA-256(SPKI(public key))[..16])
//! ```
//!
//! Login is a single-use signed-nonce challenge (see [`auth`]).

pub mod auth;
pub mod challenge;
pub mod identity;
pub mod kdf;
pub mod phrase;
pub mod session;

pub use auth::{AccessToken, AccountDirectory, InMemoryDirectory, LoginService, RandomTokenIssuer, TokenIssuer};
pub use challenge::NonceStore;
pub use identity::{derive_key_pair, sign, verify, IdentityKeyPair, PublicIdentity};
pub use kdf::{derive_key, KdfParams, MasterSeed, SessionKey};
pub use phrase::{generate_phrase, SeedPhrase};
pub use session::{CryptoSession, SealedBox};

/// Size of an AES-256 key / master seed in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM initialization vector (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of the PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Size of the GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a login nonce
pub const NONCE_SIZE: usize = 16;
