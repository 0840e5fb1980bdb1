//! File-backed sliding-window rate limiter.
//!
//! Each `(identifier, action)` pair owns one JSON file holding the attempt
//! timestamps still inside the window. Workers coordinate only through those
//! files, so the limiter holds across processes.
//!
//! `check` followed by `record` is not atomic; concurrent requests can slip a
//! few attempts past `max_attempts`. Treat the limiter as throttling, not as a
//! security boundary.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::cache::{AtomicFileStore, StoreError};
use crate::util::clock::{Clock, SystemClock, from_unix_micros, unix_micros};

pub(crate) const METRIC_RATE_LIMIT_REJECTED: &str = "atelier_rate_limit_rejected_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }

    fn window_micros(&self) -> i64 {
        i64::try_from(self.window.whole_microseconds()).unwrap_or(i64::MAX)
    }
}

/// Outcome of [`RateLimiter::attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: OffsetDateTime },
}

/// Persisted attempt set; timestamps are unix microseconds in ascending order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RateLimitWindow {
    attempts: Vec<i64>,
}

impl RateLimitWindow {
    fn prune(&mut self, cutoff: i64) {
        self.attempts.retain(|at| *at > cutoff);
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: AtomicFileStore,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: AtomicFileStore, policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    /// Open a limiter over `directory` using the system clock.
    pub fn open(directory: impl Into<PathBuf>, policy: RateLimitPolicy) -> Result<Self, StoreError> {
        let store = AtomicFileStore::open(directory)?;
        Ok(Self::new(store, policy, Arc::new(SystemClock)))
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Current time on the limiter's clock.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// True while fewer than `max_attempts` attempts fall inside the window.
    pub fn check(&self, identifier: &str, action: &str) -> bool {
        let live = self.live_attempts(identifier, action);
        live.len() < self.policy.max_attempts as usize
    }

    /// Append `now` to the window, pruning expired attempts first.
    pub fn record(&self, identifier: &str, action: &str) {
        let name = window_file_name(identifier, action);
        let now = unix_micros(self.clock.now());
        let cutoff = now.saturating_sub(self.policy.window_micros());

        let result = self.store.lock(&name).and_then(|guard| {
            let mut window = decode_window(&name, guard.read()?);
            window.prune(cutoff);
            // Attempts landing on the same microsecond still count separately.
            let stamp = match window.attempts.last() {
                Some(last) if *last >= now => last + 1,
                _ => now,
            };
            window.attempts.push(stamp);
            guard.replace(&encode_window(&window))
        });

        if let Err(err) = result {
            log_failure("record", identifier, action, &err);
        }
    }

    /// When limited, the instant the oldest attempt leaves the window.
    pub fn retry_after(&self, identifier: &str, action: &str) -> Option<OffsetDateTime> {
        let live = self.live_attempts(identifier, action);
        if live.len() < self.policy.max_attempts as usize {
            return None;
        }
        live.first()
            .map(|oldest| from_unix_micros(*oldest) + self.policy.window)
    }

    pub fn remaining_attempts(&self, identifier: &str, action: &str) -> u32 {
        let live = self.live_attempts(identifier, action);
        let used = u32::try_from(live.len()).unwrap_or(u32::MAX);
        self.policy.max_attempts.saturating_sub(used)
    }

    /// Forget every attempt for the pair.
    pub fn reset(&self, identifier: &str, action: &str) {
        let name = window_file_name(identifier, action);
        let result = self.store.lock(&name).and_then(|guard| guard.remove());
        match result {
            Ok(removed) => debug!(identifier, action, removed, "Rate limit window reset"),
            Err(err) => log_failure("reset", identifier, action, &err),
        }
    }

    /// Check and, if allowed, record one attempt.
    pub fn attempt(&self, identifier: &str, action: &str) -> RateLimitDecision {
        if !self.check(identifier, action) {
            counter!(METRIC_RATE_LIMIT_REJECTED, "action" => action.to_string()).increment(1);
            let retry_after = self
                .retry_after(identifier, action)
                .unwrap_or_else(|| self.clock.now() + self.policy.window);
            return RateLimitDecision::Limited { retry_after };
        }
        self.record(identifier, action);
        RateLimitDecision::Allowed {
            remaining: self.remaining_attempts(identifier, action),
        }
    }

    /// Drop window files whose attempts have all expired, along with their
    /// lock files.
    ///
    /// Returns the number of windows removed.
    pub fn sweep_expired(&self) -> usize {
        let names = match self.store.list() {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    target = "atelier::application::rate_limit",
                    op = "sweep_expired",
                    error = %err,
                    "Failed to enumerate rate limit windows"
                );
                return 0;
            }
        };
        let cutoff = unix_micros(self.clock.now()).saturating_sub(self.policy.window_micros());

        let removed = names
            .iter()
            .filter(|name| {
                let result = self.store.lock(name).and_then(|guard| {
                    let mut window = decode_window(name, guard.read()?);
                    window.prune(cutoff);
                    if window.attempts.is_empty() {
                        guard.remove()
                    } else {
                        Ok(false)
                    }
                });
                result.unwrap_or(false)
            })
            .count();

        if let Err(err) = self.store.prune_orphan_locks() {
            warn!(
                target = "atelier::application::rate_limit",
                op = "sweep_expired",
                error = %err,
                "Failed to prune rate limit lock files"
            );
        }
        removed
    }

    fn live_attempts(&self, identifier: &str, action: &str) -> Vec<i64> {
        let name = window_file_name(identifier, action);
        let cutoff = unix_micros(self.clock.now()).saturating_sub(self.policy.window_micros());
        match self.store.read(&name) {
            Ok(raw) => {
                let mut window = decode_window(&name, raw);
                window.prune(cutoff);
                window.attempts
            }
            Err(err) => {
                // Fail open: a broken limiter must not block traffic.
                log_failure("read", identifier, action, &err);
                Vec::new()
            }
        }
    }
}

/// `sha256(identifier ":" action)` in hex, so arbitrary identifiers never
/// reach the filesystem.
pub fn window_file_name(identifier: &str, action: &str) -> String {
    let digest = Sha256::digest(format!("{identifier}:{action}").as_bytes());
    format!("{}.json", hex::encode(digest))
}

fn decode_window(name: &str, raw: Option<bytes::Bytes>) -> RateLimitWindow {
    let Some(raw) = raw else {
        return RateLimitWindow::default();
    };
    match serde_json::from_slice::<RateLimitWindow>(&raw) {
        Ok(mut window) => {
            window.attempts.sort_unstable();
            window
        }
        Err(err) => {
            warn!(
                target = "atelier::application::rate_limit",
                op = "decode",
                file = name,
                error = %err,
                "Discarding unreadable rate limit window"
            );
            RateLimitWindow::default()
        }
    }
}

fn encode_window(window: &RateLimitWindow) -> Vec<u8> {
    serde_json::to_vec(window).unwrap_or_else(|_| b"{\"attempts\":[]}".to_vec())
}

fn log_failure(op: &'static str, identifier: &str, action: &str, err: &StoreError) {
    warn!(
        target = "atelier::application::rate_limit",
        op,
        identifier,
        action,
        error = %err,
        "Rate limit storage failed; allowing request"
    );
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use time::macros::datetime;

    use super::*;
    use crate::util::clock::ManualClock;

    fn limiter(max_attempts: u32, window_secs: i64) -> (TempDir, Arc<ManualClock>, RateLimiter) {
        let dir = TempDir::new().expect("temp dir");
        let store = AtomicFileStore::open(dir.path()).expect("store");
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let limiter = RateLimiter::new(
            store,
            RateLimitPolicy::new(max_attempts, Duration::seconds(window_secs)),
            clock.clone(),
        );
        (dir, clock, limiter)
    }

    #[test]
    fn file_name_is_hashed() {
        let name = window_file_name("1.2.3.4", "view");
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(name.trim_end_matches(".json").chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, window_file_name("1.2.3.4", "upload"));
        assert_eq!(
            window_file_name("../../etc", "x"),
            window_file_name("../../etc", "x")
        );
    }

    #[test]
    fn limits_after_max_attempts() {
        let (_dir, clock, limiter) = limiter(3, 60);
        let first = clock.now();

        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4", "x"));
            limiter.record("1.2.3.4", "x");
            clock.advance(Duration::seconds(1));
        }

        assert!(!limiter.check("1.2.3.4", "x"));
        assert_eq!(limiter.remaining_attempts("1.2.3.4", "x"), 0);
        assert_eq!(
            limiter.retry_after("1.2.3.4", "x"),
            Some(first + Duration::seconds(60))
        );
        assert!(limiter.check("5.6.7.8", "x"));
        assert!(limiter.check("1.2.3.4", "y"));
    }

    #[test]
    fn recovers_once_oldest_attempt_expires() {
        let (_dir, clock, limiter) = limiter(2, 60);
        limiter.record("ip", "view");
        clock.advance(Duration::seconds(10));
        limiter.record("ip", "view");
        assert!(!limiter.check("ip", "view"));

        clock.advance(Duration::seconds(50));
        assert!(limiter.check("ip", "view"));
        assert_eq!(limiter.retry_after("ip", "view"), None);
        assert_eq!(limiter.remaining_attempts("ip", "view"), 1);
    }

    #[test]
    fn same_instant_attempts_all_count() {
        let (_dir, _clock, limiter) = limiter(3, 60);
        for _ in 0..3 {
            limiter.record("ip", "burst");
        }
        assert!(!limiter.check("ip", "burst"));
    }

    #[test]
    fn reset_clears_window() {
        let (_dir, _clock, limiter) = limiter(1, 60);
        limiter.record("ip", "view");
        assert!(!limiter.check("ip", "view"));

        limiter.reset("ip", "view");
        assert!(limiter.check("ip", "view"));
        assert_eq!(limiter.remaining_attempts("ip", "view"), 1);
    }

    #[test]
    fn attempt_reports_decision() {
        let (_dir, _clock, limiter) = limiter(2, 60);
        assert_eq!(
            limiter.attempt("ip", "view"),
            RateLimitDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.attempt("ip", "view"),
            RateLimitDecision::Allowed { remaining: 0 }
        );
        assert!(matches!(
            limiter.attempt("ip", "view"),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn corrupt_window_is_treated_as_empty() {
        let (dir, _clock, limiter) = limiter(1, 60);
        std::fs::write(dir.path().join(window_file_name("ip", "view")), b"garbage")
            .expect("write corrupt window");

        assert!(limiter.check("ip", "view"));
        limiter.record("ip", "view");
        assert!(!limiter.check("ip", "view"));
    }

    #[test]
    fn sweep_removes_only_expired_windows() {
        let (_dir, clock, limiter) = limiter(5, 60);
        limiter.record("old", "view");
        clock.advance(Duration::seconds(90));
        limiter.record("fresh", "view");

        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.remaining_attempts("fresh", "view"), 4);
    }
}
