// src/backoff.rs
use crate::types::BackoffConfig;
use crate::utils::extract_root_domain;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub attempts: u32,
    pub total_requests: u64,
}

/// Adaptive exponential backoff, keyed by root host so that every candidate
/// under `example.com` shares one budget.
#[derive(Debug)]
pub struct RateController {
    config: BackoffConfig,
    hosts: Mutex<HashMap<String, BackoffState>>,
}

impl RateController {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn hosts(&self) -> MutexGuard<'_, HashMap<String, BackoffState>> {
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a failed attempt and returns the delay to wait before the next one.
    pub fn next_delay(&self, host: &str) -> Duration {
        let key = extract_root_domain(host);
        let attempts = {
            let mut hosts = self.hosts();
            let state = hosts.entry(key).or_default();
            state.attempts += 1;
            state.total_requests += 1;
            state.attempts
        };

        self.delay_for(attempts, rand::thread_rng().gen::<f64>())
    }

    /// Success walks the attempt counter back by one, failure escalates.
    pub fn adaptive_delay(&self, host: &str, success: bool) -> Duration {
        if !success {
            return self.next_delay(host);
        }

        let key = extract_root_domain(host);
        let attempts = {
            let mut hosts = self.hosts();
            let state = hosts.entry(key).or_default();
            state.attempts = state.attempts.saturating_sub(1);
            state.attempts
        };

        self.delay_for(attempts, 0.0)
    }

    /// Delay at the host's current attempt count, without recording anything.
    pub fn current_delay(&self, host: &str) -> Duration {
        let attempts = self.attempts(host);
        self.delay_for(attempts, rand::thread_rng().gen::<f64>())
    }

    pub fn is_rate_limited(&self, host: &str, threshold: u32) -> bool {
        self.attempts(host) >= threshold
    }

    pub fn attempts(&self, host: &str) -> u32 {
        self.hosts()
            .get(&extract_root_domain(host))
            .map(|state| state.attempts)
            .unwrap_or(0)
    }

    pub fn request_count(&self, host: &str) -> u64 {
        self.hosts()
            .get(&extract_root_domain(host))
            .map(|state| state.total_requests)
            .unwrap_or(0)
    }

    pub fn reset(&self, host: &str) {
        if let Some(state) = self.hosts().get_mut(&extract_root_domain(host)) {
            state.attempts = 0;
        }
    }

    /// Clears every attempt counter; request totals are kept.
    pub fn reset_all(&self) {
        for state in self.hosts().values_mut() {
            state.attempts = 0;
        }
    }

    /// `base * factor^(attempts-1)`, plus up to `jitter` of itself, capped at
    /// `max_delay`. Zero attempts means no delay at all.
    fn delay_for(&self, attempts: u32, random: f64) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let base = self.config.base_delay.as_nanos() as f64;
        let exponent = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
        let mut delay = base * self.config.factor.powi(exponent);
        delay += self.config.jitter * random * delay;

        let max = self.config.max_delay.as_nanos() as f64;
        if !delay.is_finite() || delay > max {
            delay = max;
        }

        Duration::from_nanos(delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(jitter: f64) -> RateController {
        RateController::new(BackoffConfig {
            enabled: true,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter,
            fail_threshold: 3,
        })
    }

    #[test]
    fn test_next_delay_grows_exponentially_and_saturates() {
        let backoff = controller(0.0);
        assert_eq!(backoff.next_delay("example.com"), Duration::from_millis(100));
        assert_eq!(backoff.next_delay("example.com"), Duration::from_millis(200));
        assert_eq!(backoff.next_delay("example.com"), Duration::from_millis(400));
        assert_eq!(backoff.next_delay("example.com"), Duration::from_millis(800));
        assert_eq!(backoff.next_delay("example.com"), Duration::from_secs(1));

        for _ in 0..100 {
            assert_eq!(backoff.next_delay("example.com"), Duration::from_secs(1));
        }
    }

    #[test]
    fn test_adaptive_recovery_after_failures() {
        let backoff = controller(0.0);
        for _ in 0..3 {
            backoff.adaptive_delay("example.com", false);
        }
        assert_eq!(backoff.attempts("example.com"), 3);

        let at_three = backoff.delay_for(3, 0.0);
        let recovered = backoff.adaptive_delay("example.com", true);
        assert_eq!(backoff.attempts("example.com"), 2);
        assert_eq!(recovered, Duration::from_millis(200));
        assert!(recovered < at_three);
    }

    #[test]
    fn test_attempts_never_go_negative() {
        let backoff = controller(0.0);
        assert_eq!(backoff.adaptive_delay("example.com", true), Duration::ZERO);
        assert_eq!(backoff.attempts("example.com"), 0);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = controller(0.5);
        for _ in 0..50 {
            backoff.reset("example.com");
            let delay = backoff.next_delay("example.com");
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_sibling_subdomains_share_state() {
        let backoff = controller(0.0);
        backoff.next_delay("www.example.com");
        backoff.next_delay("api.dev.example.com");

        assert_eq!(backoff.attempts("example.com"), 2);
        assert_eq!(backoff.request_count("mail.example.com"), 2);
        assert_eq!(backoff.attempts("example.org"), 0);
    }

    #[test]
    fn test_rate_limited_threshold_and_reset() {
        let backoff = controller(0.0);
        for _ in 0..3 {
            backoff.next_delay("a.example.com");
        }
        backoff.next_delay("b.example.net");

        assert!(backoff.is_rate_limited("example.com", 3));
        assert!(!backoff.is_rate_limited("example.net", 3));

        backoff.reset("example.com");
        assert!(!backoff.is_rate_limited("example.com", 3));
        assert_eq!(backoff.request_count("example.com"), 3);

        backoff.next_delay("b.example.net");
        backoff.reset_all();
        assert_eq!(backoff.attempts("example.net"), 0);
        assert_eq!(backoff.current_delay("example.net"), Duration::ZERO);
    }
}
