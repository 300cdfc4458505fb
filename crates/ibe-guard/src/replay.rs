// replay.rs — Nonce replay cache.
//
// An envelope nonce may only be consumed once within the replay window.
// Check-and-record happens under a single lock so two concurrent requests
// carrying the same nonce cannot both observe it as fresh.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// How long a consumed nonce blocks reuse.
pub const DEFAULT_REPLAY_WINDOW_MINUTES: i64 = 10;

/// Expired entries are swept after this many inserts.
const SWEEP_INTERVAL: u64 = 256;

/// Result of presenting a nonce to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Not seen within the window; now recorded as consumed at `now`.
    Fresh,
    /// Already consumed at `first_seen`, which is still inside the window.
    Replayed { first_seen: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct Seen {
    nonces: HashMap<String, DateTime<Utc>>,
    inserts: u64,
}

/// Process-local record of consumed nonces.
#[derive(Debug)]
pub struct ReplayCache {
    window: Duration,
    seen: Mutex<Seen>,
}

impl ReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(Seen::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Atomically test `nonce` and, if fresh, record it as consumed at `now`.
    ///
    /// A nonce whose first use is at least `window` old is fresh again.
    pub fn check_and_record(&self, nonce: &str, now: DateTime<Utc>) -> ReplayCheck {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&first_seen) = seen.nonces.get(nonce) {
            if now - first_seen < self.window {
                return ReplayCheck::Replayed { first_seen };
            }
        }
        seen.nonces.insert(nonce.to_string(), now);
        seen.inserts += 1;
        if seen.inserts % SWEEP_INTERVAL == 0 {
            let window = self.window;
            let before = seen.nonces.len();
            seen.nonces.retain(|_, first| now - *first < window);
            tracing::debug!(
                evicted = before - seen.nonces.len(),
                remaining = seen.nonces.len(),
                "swept replay cache"
            );
        }
        ReplayCheck::Fresh
    }

    /// Test `nonce` without recording it.
    pub fn is_replayed(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.nonces
            .get(nonce)
            .is_some_and(|first| now - *first < self.window)
    }

    /// Drop every entry whose window has closed at `now`.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let window = self.window;
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.nonces.retain(|_, first| now - *first < window);
    }

    /// Number of nonces currently held.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .nonces
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_REPLAY_WINDOW_MINUTES))
    }
}
