//! In-memory attempt tracking and lockout.
//!
//! Each client key moves through a small state machine:
//!
//! - absent: `Open(0)`
//! - `Open { failures, last_failure }`: `failures` in `1..max_attempts`
//! - `Locked { until }`: every request is rejected until `until`
//!
//! A failure in `Open(max_attempts - 1)` locks the key. A success removes it.
//! An `Open` entry whose last failure is older than the lockout window decays
//! back to `Open(0)`, and a lock expires at `until`; the sweeper drops both.
//!
//! All transitions for all keys run under one mutex. The critical sections
//! are pure map operations (no `.await` while held), so the increment and the
//! threshold check for a key are a single indivisible step.

use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_LOCKOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptPolicy {
    max_attempts: u32,
    lockout: Duration,
    max_tracked_clients: usize,
}

impl AttemptPolicy {
    /// Default policy: 3 attempts, 60s lockout, 10 000 tracked clients.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: DEFAULT_LOCKOUT,
            max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: u64) -> Self {
        self.lockout = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_max_tracked_clients(mut self, max_tracked_clients: usize) -> Self {
        self.max_tracked_clients = max_tracked_clients.max(1);
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn lockout(&self) -> Duration {
        self.lockout
    }

    #[must_use]
    pub const fn max_tracked_clients(&self) -> usize {
        self.max_tracked_clients
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer to "may this key attempt a verification right now?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptGate {
    Open { failures: u32 },
    Locked { retry_after: Duration },
}

/// Result of recording one failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still open; `remaining_attempts` is in `1..max_attempts`.
    Denied { remaining_attempts: u32 },
    /// This failure crossed the threshold and started a lockout.
    LockedOut,
    /// Another request locked the key between its check and this failure.
    AlreadyLocked { retry_after: Duration },
}

#[derive(Clone, Copy, Debug)]
enum AttemptState {
    Open { failures: u32, last_failure: Instant },
    Locked { until: Instant },
}

impl AttemptState {
    fn expires_at(&self, lockout: Duration) -> Instant {
        match *self {
            Self::Open { last_failure, .. } => last_failure + lockout,
            Self::Locked { until } => until,
        }
    }
}

#[derive(Debug)]
pub struct AttemptTracker {
    policy: AttemptPolicy,
    entries: Mutex<HashMap<String, AttemptState>>,
}

impl AttemptTracker {
    #[must_use]
    pub fn new(policy: AttemptPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    pub async fn check(&self, key: &str, now: Instant) -> AttemptGate {
        let mut entries = self.entries.lock().await;

        let Some(state) = entries.get(key).copied() else {
            return AttemptGate::Open { failures: 0 };
        };

        if now >= state.expires_at(self.policy.lockout) {
            entries.remove(key);
            debug!(client = key, "attempt history expired");
            return AttemptGate::Open { failures: 0 };
        }

        match state {
            AttemptState::Open { failures, .. } => AttemptGate::Open { failures },
            AttemptState::Locked { until } => AttemptGate::Locked {
                retry_after: until.saturating_duration_since(now),
            },
        }
    }

    pub async fn record_failure(&self, key: &str, now: Instant) -> FailureOutcome {
        let lockout = self.policy.lockout;
        let max_attempts = self.policy.max_attempts;
        let mut entries = self.entries.lock().await;

        let previous = entries
            .get(key)
            .copied()
            .filter(|state| now < state.expires_at(lockout));

        let failures = match previous {
            Some(AttemptState::Locked { until }) => {
                return FailureOutcome::AlreadyLocked {
                    retry_after: until.saturating_duration_since(now),
                };
            }
            Some(AttemptState::Open { failures, .. }) => failures + 1,
            None => 1,
        };

        // A new key only gets tracked if there is room without dropping a lock.
        let tracked = entries.contains_key(key) || self.make_room(&mut entries, now);

        if !tracked {
            warn!(client = key, "attempt map full of active locks, failure not tracked");
        }

        if failures >= max_attempts {
            if tracked {
                entries.insert(
                    key.to_string(),
                    AttemptState::Locked {
                        until: now + lockout,
                    },
                );
            }
            warn!(
                client = key,
                lockout_seconds = lockout.as_secs(),
                "too many failed attempts, client locked out"
            );
            FailureOutcome::LockedOut
        } else {
            if tracked {
                entries.insert(
                    key.to_string(),
                    AttemptState::Open {
                        failures,
                        last_failure: now,
                    },
                );
            }
            FailureOutcome::Denied {
                remaining_attempts: max_attempts - failures,
            }
        }
    }

    pub async fn record_success(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop every entry whose lock or failure window has elapsed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let lockout = self.policy.lockout;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, state| now < state.expires_at(lockout));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // Makes room for one new key. Only `Open` entries are evicted, oldest
    // failure first; active locks are never dropped. Returns false when every
    // remaining entry is locked and the map is still full.
    fn make_room(&self, entries: &mut HashMap<String, AttemptState>, now: Instant) -> bool {
        let lockout = self.policy.lockout;
        if entries.len() < self.policy.max_tracked_clients {
            return true;
        }

        entries.retain(|_, state| now < state.expires_at(lockout));

        while entries.len() >= self.policy.max_tracked_clients {
            let Some(oldest) = entries
                .iter()
                .filter_map(|(key, state)| match state {
                    AttemptState::Open { last_failure, .. } => Some((key, *last_failure)),
                    AttemptState::Locked { .. } => None,
                })
                .min_by_key(|(_, last_failure)| *last_failure)
                .map(|(key, _)| key.clone())
            else {
                return false;
            };
            debug!(client = %oldest, "attempt map full, evicting oldest open entry");
            entries.remove(&oldest);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracker(max_attempts: u32) -> AttemptTracker {
        AttemptTracker::new(
            AttemptPolicy::new()
                .with_max_attempts(max_attempts)
                .with_lockout_seconds(60),
        )
    }

    #[tokio::test]
    async fn unseen_key_is_open() {
        let tracker = tracker(3);
        assert_eq!(
            tracker.check("10.0.0.1", Instant::now()).await,
            AttemptGate::Open { failures: 0 }
        );
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn failures_count_down_then_lock() {
        let tracker = tracker(3);
        let now = Instant::now();

        assert_eq!(
            tracker.record_failure("a", now).await,
            FailureOutcome::Denied {
                remaining_attempts: 2
            }
        );
        assert_eq!(
            tracker.record_failure("a", now).await,
            FailureOutcome::Denied {
                remaining_attempts: 1
            }
        );
        assert_eq!(tracker.record_failure("a", now).await, FailureOutcome::LockedOut);
        assert_eq!(
            tracker.check("a", now).await,
            AttemptGate::Locked {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[tokio::test]
    async fn single_attempt_policy_locks_on_first_failure() {
        let tracker = tracker(1);
        assert_eq!(
            tracker.record_failure("a", Instant::now()).await,
            FailureOutcome::LockedOut
        );
    }

    #[tokio::test]
    async fn lock_expires_after_window() {
        let tracker = tracker(2);
        let now = Instant::now();
        tracker.record_failure("a", now).await;
        tracker.record_failure("a", now).await;

        let almost = now + Duration::from_secs(59);
        assert!(matches!(
            tracker.check("a", almost).await,
            AttemptGate::Locked { .. }
        ));

        let later = now + Duration::from_secs(60);
        assert_eq!(
            tracker.check("a", later).await,
            AttemptGate::Open { failures: 0 }
        );
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn stale_failures_decay() {
        let tracker = tracker(3);
        let now = Instant::now();
        tracker.record_failure("a", now).await;
        tracker.record_failure("a", now).await;

        let later = now + Duration::from_secs(61);
        assert_eq!(
            tracker.record_failure("a", later).await,
            FailureOutcome::Denied {
                remaining_attempts: 2
            }
        );
    }

    #[tokio::test]
    async fn success_clears_history() {
        let tracker = tracker(3);
        let now = Instant::now();
        tracker.record_failure("a", now).await;
        tracker.record_success("a").await;

        tracker.record_failure("a", now).await;
        assert_eq!(
            tracker.record_failure("a", now).await,
            FailureOutcome::Denied {
                remaining_attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let tracker = tracker(1);
        let now = Instant::now();
        tracker.record_failure("a", now).await;

        assert!(matches!(tracker.check("a", now).await, AttemptGate::Locked { .. }));
        assert_eq!(
            tracker.check("b", now).await,
            AttemptGate::Open { failures: 0 }
        );
    }

    #[tokio::test]
    async fn failure_while_locked_does_not_extend_lock() {
        let tracker = tracker(1);
        let now = Instant::now();
        tracker.record_failure("a", now).await;

        let later = now + Duration::from_secs(30);
        assert_eq!(
            tracker.record_failure("a", later).await,
            FailureOutcome::AlreadyLocked {
                retry_after: Duration::from_secs(30)
            }
        );
        assert_eq!(
            tracker.check("a", now + Duration::from_secs(60)).await,
            AttemptGate::Open { failures: 0 }
        );
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let tracker = tracker(3);
        let now = Instant::now();
        tracker.record_failure("old", now).await;
        tracker
            .record_failure("new", now + Duration::from_secs(30))
            .await;

        assert_eq!(tracker.sweep(now + Duration::from_secs(61)).await, 1);
        assert_eq!(tracker.len().await, 1);
    }

    #[tokio::test]
    async fn map_is_bounded() {
        let tracker = AttemptTracker::new(
            AttemptPolicy::new()
                .with_max_attempts(3)
                .with_max_tracked_clients(2),
        );
        let now = Instant::now();
        tracker.record_failure("a", now).await;
        tracker
            .record_failure("b", now + Duration::from_secs(1))
            .await;
        tracker
            .record_failure("c", now + Duration::from_secs(2))
            .await;

        assert_eq!(tracker.len().await, 2);
        // "a" has the oldest failure and was evicted
        assert_eq!(
            tracker.check("a", now + Duration::from_secs(2)).await,
            AttemptGate::Open { failures: 0 }
        );
        assert_eq!(
            tracker.check("c", now + Duration::from_secs(2)).await,
            AttemptGate::Open { failures: 1 }
        );
    }

    #[tokio::test]
    async fn full_map_keeps_active_lock() {
        let tracker = AttemptTracker::new(
            AttemptPolicy::new()
                .with_max_attempts(1)
                .with_lockout_seconds(60)
                .with_max_tracked_clients(2),
        );
        let now = Instant::now();
        let later = now + Duration::from_secs(1);

        assert_eq!(
            tracker.record_failure("attacker", now).await,
            FailureOutcome::LockedOut
        );
        tracker.record_failure("spray-1", later).await;
        tracker.record_failure("spray-2", later).await;

        assert_eq!(tracker.len().await, 2);
        assert_eq!(
            tracker.check("attacker", later).await,
            AttemptGate::Locked {
                retry_after: Duration::from_secs(59)
            }
        );
    }

    #[tokio::test]
    async fn full_map_of_locks_refuses_new_keys() {
        let tracker = AttemptTracker::new(
            AttemptPolicy::new()
                .with_max_attempts(1)
                .with_max_tracked_clients(2),
        );
        let now = Instant::now();
        tracker.record_failure("a", now).await;
        tracker.record_failure("b", now).await;

        assert_eq!(
            tracker.record_failure("c", now).await,
            FailureOutcome::LockedOut
        );
        assert_eq!(tracker.len().await, 2);
        assert!(matches!(
            tracker.check("a", now).await,
            AttemptGate::Locked { .. }
        ));
        assert!(matches!(
            tracker.check("b", now).await,
            AttemptGate::Locked { .. }
        ));
        assert_eq!(
            tracker.check("c", now).await,
            AttemptGate::Open { failures: 0 }
        );
    }

    #[tokio::test]
    async fn concurrent_failures_lock_exactly_once() {
        let tracker = Arc::new(tracker(3));
        let now = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record_failure("a", now).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("task panicked"));
        }

        let locked = outcomes
            .iter()
            .filter(|outcome| **outcome == FailureOutcome::LockedOut)
            .count();
        assert_eq!(locked, 1);

        let mut remaining: Vec<u32> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FailureOutcome::Denied { remaining_attempts } => Some(*remaining_attempts),
                _ => None,
            })
            .collect();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 2]);
    }
}
