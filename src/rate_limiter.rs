//! Per-user sliding-window rate limiter.
//!
//! Every expensive entry point asks [`RateLimiter::admit`] before doing any
//! work. Windows for all users share one map lock, which also serializes
//! concurrent admissions for the same user.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::session::UserId;

/// Sliding-window request counter keyed by Telegram user id
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<UserId, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject a request made by `user_id` at `now`.
    ///
    /// Entries at least one window old are pruned first. A rejected request
    /// is not recorded, so a burst of rejections does not extend the block.
    pub fn admit(&self, user_id: UserId, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let requests = windows.entry(user_id).or_default();

        requests.retain(|&t| now.saturating_duration_since(t) < self.window);

        if requests.len() >= self.max_requests {
            return false;
        }

        requests.push_back(now);
        true
    }

    /// Number of requests currently counted for `user_id`
    pub fn in_window(&self, user_id: UserId, now: Instant) -> usize {
        self.windows
            .lock()
            .get(&user_id)
            .map(|requests| {
                requests
                    .iter()
                    .filter(|&&t| now.saturating_duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop users whose whole window has aged out; returns how many were dropped.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, requests| {
            requests
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < self.window)
        });
        before - windows.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn clear(&self) {
        self.windows.lock().clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.admit(1, t0));
        assert!(limiter.admit(1, t0 + Duration::from_secs(1)));
        assert!(limiter.admit(1, t0 + Duration::from_secs(2)));
        assert!(!limiter.admit(1, t0 + Duration::from_secs(3)));

        // Other users have their own window
        assert!(limiter.admit(2, t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.admit(7, t0));
        for i in 1..10 {
            assert!(!limiter.admit(7, t0 + Duration::from_secs(i)));
        }
        assert_eq!(limiter.in_window(7, t0 + Duration::from_secs(10)), 1);

        // Only the single admitted request has to age out
        assert!(limiter.admit(7, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_entry_exactly_one_window_old_is_pruned() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.admit(1, t0));
        assert!(!limiter.admit(1, t0 + Duration::from_millis(59_999)));
        assert!(limiter.admit(1, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_never_exceeds_limit_in_any_trailing_window() {
        let limit = 10;
        let window = Duration::from_secs(60);
        let limiter = RateLimiter::new(limit, window);
        let t0 = Instant::now();

        let mut admitted = Vec::new();
        // One request every 700ms for five minutes
        for step in 0..430u64 {
            let now = t0 + Duration::from_millis(step * 700);
            if limiter.admit(42, now) {
                admitted.push(now);
            }
        }

        for &end in &admitted {
            let in_window = admitted
                .iter()
                .filter(|&&t| t <= end && end.saturating_duration_since(t) < window)
                .count();
            assert!(in_window <= limit, "{} admissions inside one window", in_window);
        }
        assert!(admitted.len() > limit);
    }

    #[test]
    fn test_prune_idle_users() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.admit(1, t0);
        limiter.admit(2, t0 + Duration::from_secs(30));
        assert_eq!(limiter.tracked_users(), 2);

        assert_eq!(limiter.prune_idle(t0 + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_users(), 1);
        assert_eq!(limiter.in_window(2, t0 + Duration::from_secs(61)), 1);
    }
}
