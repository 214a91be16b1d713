//! Fixed-window rate limiter keyed by subject
//!
//! Each key gets a counter and a reset timestamp. The first call for a key,
//! or any call at or after the reset time, opens a fresh window with the
//! count at 1. Inside a window, calls are accepted while `count < max_actions`.
//!
//! Not thread-safe on purpose: the limiter lives inside one agent's
//! `SafetyControls` and that agent runs one cycle at a time.

use crate::utils::current_timestamp_millis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counter state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u32,
    /// Unix millis at which the window expires
    pub reset_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiter {
    max_actions: u32,
    window_ms: u64,
    windows: HashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(max_actions: u32, window_ms: u64) -> Self {
        Self {
            max_actions,
            window_ms,
            windows: HashMap::new(),
        }
    }

    pub fn max_actions(&self) -> u32 {
        self.max_actions
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Try to take one action for `key` now
    pub fn can_take_action(&mut self, key: &str) -> bool {
        self.can_take_action_at(key, current_timestamp_millis())
    }

    /// Try to take one action for `key` at a given instant (unix millis)
    pub fn can_take_action_at(&mut self, key: &str, now: u64) -> bool {
        if self.max_actions == 0 {
            return false;
        }

        match self.windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count < self.max_actions {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                self.windows.insert(
                    key.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now.saturating_add(self.window_ms),
                    },
                );
                true
            }
        }
    }

    /// Actions left in the current window for `key`
    pub fn remaining_actions_at(&self, key: &str, now: u64) -> u32 {
        match self.windows.get(key) {
            Some(window) if now < window.reset_at => self.max_actions.saturating_sub(window.count),
            _ => self.max_actions,
        }
    }

    /// When the current window for `key` resets, if one is open
    pub fn reset_time(&self, key: &str) -> Option<u64> {
        self.windows.get(key).map(|w| w.reset_at)
    }

    /// Drop all state for `key`
    pub fn reset(&mut self, key: &str) {
        self.windows.remove(key);
    }

    /// Raw window for `key` (checkpoint inspection)
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max_within_window() {
        let mut limiter = RateLimiter::new(3, 1_000);
        assert!(limiter.can_take_action_at("agent", 0));
        assert!(limiter.can_take_action_at("agent", 10));
        assert!(limiter.can_take_action_at("agent", 20));
        assert!(!limiter.can_take_action_at("agent", 30));
        assert!(!limiter.can_take_action_at("agent", 999));
        assert_eq!(limiter.remaining_actions_at("agent", 999), 0);
    }

    #[test]
    fn test_denied_call_does_not_increment() {
        let mut limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.can_take_action_at("k", 0));
        assert!(!limiter.can_take_action_at("k", 1));
        assert!(!limiter.can_take_action_at("k", 2));
        assert_eq!(limiter.window("k").map(|w| w.count), Some(1));
    }

    #[test]
    fn test_window_boundary_resets_to_one() {
        let mut limiter = RateLimiter::new(2, 1_000);
        assert!(limiter.can_take_action_at("k", 0));
        assert!(limiter.can_take_action_at("k", 500));
        assert!(!limiter.can_take_action_at("k", 999));

        // now == reset_at opens a new window
        assert!(limiter.can_take_action_at("k", 1_000));
        assert_eq!(limiter.window("k").map(|w| w.count), Some(1));
        assert_eq!(limiter.reset_time("k"), Some(2_000));
        assert_eq!(limiter.remaining_actions_at("k", 1_001), 1);
    }

    #[test]
    fn test_never_exceeds_max_in_any_window() {
        let mut limiter = RateLimiter::new(5, 100);
        let mut accepted_per_window: HashMap<u64, u32> = HashMap::new();
        for t in 0..1_000u64 {
            if limiter.can_take_action_at("k", t) {
                let start = limiter.reset_time("k").unwrap_or(0) - 100;
                *accepted_per_window.entry(start).or_default() += 1;
            }
        }
        assert!(accepted_per_window.values().all(|&n| n <= 5));
        assert_eq!(accepted_per_window.len(), 10);
    }

    #[test]
    fn test_keys_are_independent_and_reset_clears() {
        let mut limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.can_take_action_at("a", 0));
        assert!(limiter.can_take_action_at("b", 0));
        assert!(!limiter.can_take_action_at("a", 1));

        limiter.reset("a");
        assert_eq!(limiter.reset_time("a"), None);
        assert_eq!(limiter.remaining_actions_at("a", 1), 1);
        assert!(limiter.can_take_action_at("a", 1));
    }
}
