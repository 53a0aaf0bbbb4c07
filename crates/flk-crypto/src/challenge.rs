//! Single-use login nonces with a short TTL.
//!
//! The map is the only shared mutable state in the login path. Consumption is
//! a remove under the lock, so two concurrent verifications of the same nonce
//! cannot both see it live.
//!
//! Issuing sweeps expired entries first, so challenges requested for ids that
//! never finish a login do not outlive their TTL by more than one issue call.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::RngCore;

use flk_core::AuthRejection;

use crate::NONCE_SIZE;

/// Default nonce lifetime
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(15);

struct Challenge {
    nonce: [u8; NONCE_SIZE],
    issued_at: Instant,
}

/// Outstanding challenges keyed by user id.
pub struct NonceStore {
    entries: Mutex<HashMap<String, Challenge>>,
    ttl: Duration,
}

impl NonceStore {
    pub fn new(ttl: Duration) -> Self {
        NonceStore {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Challenge>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a fresh nonce for `user_id`, replacing any outstanding one.
    pub fn issue(&self, user_id: &str) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut map = self.lock();
        let ttl = self.ttl;
        map.retain(|_, c| c.issued_at.elapsed() < ttl);
        map.insert(
            user_id.to_string(),
            Challenge {
                nonce,
                issued_at: Instant::now(),
            },
        );
        nonce
    }

    /// Remove and return the nonce for `user_id`.
    ///
    /// The entry is gone after this call whatever the outcome, so a nonce can
    /// be presented at most once.
    pub fn take(&self, user_id: &str) -> Result<[u8; NONCE_SIZE], AuthRejection> {
        let challenge = self
            .lock()
            .remove(user_id)
            .ok_or(AuthRejection::NonceMissing)?;

        if challenge.issued_at.elapsed() >= self.ttl {
            return Err(AuthRejection::NonceExpired);
        }
        Ok(challenge.nonce)
    }

    pub fn is_pending(&self, user_id: &str) -> bool {
        self.lock()
            .get(user_id)
            .is_some_and(|c| c.issued_at.elapsed() < self.ttl)
    }

    /// Drop expired challenges now. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, c| c.issued_at.elapsed() < self.ttl);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NonceStore {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_TTL)
    }
}
