use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A bucket's allowance: at most `max_attempts` within `window`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub max_attempts: u64,
    pub window: Duration,
}

/// CV verification emails per client IP.
pub const VERIFICATION_LINKS: Limit = Limit {
    max_attempts: 3,
    window: Duration::from_secs(15 * 60),
};

/// Anonymous comments per client IP.
pub const ANONYMOUS_COMMENTS: Limit = Limit {
    max_attempts: 5,
    window: Duration::from_secs(10 * 60),
};

/// In-memory rate limiter keyed by "<bucket>:<ip>".
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt and return true if it is allowed (under the limit).
    pub fn check_and_record(&self, key: &str, limit: Limit) -> bool {
        // A panic while holding the lock leaves only timestamps behind; keep going.
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let attempts = map.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < limit.window);

        if (attempts.len() as u64) < limit.max_attempts {
            attempts.push(now);
            true
        } else {
            false
        }
    }

    /// Drop entries older than `max_age` (called from the background task).
    pub fn cleanup(&self, max_age: Duration) {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        map.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < max_age);
            !attempts.is_empty()
        });
    }
}
