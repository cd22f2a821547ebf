//! In-memory rate limiting for promo endpoints.
//!
//! Promo codes are short and guessable, so validation attempts are
//! throttled per user. State is in-memory and resets on restart; safe to
//! share via `Arc` across handler tasks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

/// Sliding-window rate limiter keyed by user id.
pub struct RateLimiter {
    attempts: Mutex<HashMap<Uuid, Vec<Instant>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Check `user` against the limit. Returns `true` if the attempt is
    /// allowed (and records it), `false` if the user is throttled.
    pub fn check_and_record(&self, user: Uuid) -> bool {
        let mut attempts = self.attempts.lock();
        let now = Instant::now();

        let entry = attempts.entry(user).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);

        if entry.len() >= self.max_attempts {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop users whose attempts have all expired.
    pub fn cleanup(&self) {
        let mut attempts = self.attempts.lock();
        let now = Instant::now();
        attempts.retain(|_, entries| {
            entries.retain(|t| now.duration_since(*t) < self.window);
            !entries.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, 60);
        let user = Uuid::new_v4();

        assert!(limiter.check_and_record(user));
        assert!(limiter.check_and_record(user));
        assert!(limiter.check_and_record(user));
        assert!(!limiter.check_and_record(user));
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(limiter.check_and_record(alice));
        assert!(!limiter.check_and_record(alice));
        assert!(limiter.check_and_record(bob));
    }

    #[test]
    fn test_cleanup_keeps_live_entries() {
        let limiter = RateLimiter::new(2, 60);
        let user = Uuid::new_v4();
        limiter.check_and_record(user);
        limiter.cleanup();
        // Entry is still inside the window, so the next attempt counts it
        assert!(limiter.check_and_record(user));
        assert!(!limiter.check_and_record(user));
    }
}
