//! BIP-39 seed phrases for account identities
//!
//! A new account gets a 12-word English mnemonic (128 bits of entropy plus a
//! 4-bit checksum). The phrase is shown to the user once and never stored;
//! the server only ever sees the public key derived from it.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::Zeroize;

use flk_core::{FlkError, FlkResult};

/// Words in an identity phrase
pub const WORD_COUNT: usize = 12;

/// 12 words = 128 bits of entropy
const ENTROPY_BYTES: usize = 16;

/// Length of the stretched BIP-39 seed
pub const SEED_BYTES: usize = 64;

/// A validated 12-word mnemonic.
pub struct SeedPhrase {
    mnemonic: Mnemonic,
}

impl SeedPhrase {
    /// Parse space-separated words, checking word list membership and checksum.
    pub fn parse(phrase: &str) -> FlkResult<Self> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| FlkError::Validation(format!("invalid seed phrase: {e}")))?;

        if mnemonic.word_count() != WORD_COUNT {
            return Err(FlkError::Validation(format!(
                "seed phrase must have {WORD_COUNT} words, got {}",
                mnemonic.word_count()
            )));
        }
        Ok(Self { mnemonic })
    }

    pub fn from_words(words: &[&str]) -> FlkResult<Self> {
        Self::parse(&words.join(" "))
    }

    pub fn words(&self) -> Vec<&'static str> {
        self.mnemonic.words().collect()
    }

    /// Space-joined phrase. For display to the user only; never log it.
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    /// Standard BIP-39 stretch (PBKDF2-HMAC-SHA512, 2048 rounds) with an empty passphrase.
    pub fn to_seed(&self) -> [u8; SEED_BYTES] {
        self.mnemonic.to_seed("")
    }
}

impl std::fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedPhrase")
            .field("words", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh 12-word phrase from 128 bits of OS entropy.
pub fn generate_phrase() -> FlkResult<SeedPhrase> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| FlkError::Other(anyhow::anyhow!("BIP-39 mnemonic generation failed: {e}")));
    entropy.zeroize();

    Ok(SeedPhrase { mnemonic: mnemonic? })
}
