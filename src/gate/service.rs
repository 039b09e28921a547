//! Passcode verification and administration.
//!
//! `VerificationService::verify` is the only path that reads the stored
//! passcode on behalf of a client:
//!
//! 1) Reject empty input.
//! 2) Ask the attempt tracker; a locked client is turned away before any I/O.
//! 3) Load the active passcode and compare it in constant time.
//! 4) Record the success or failure, then (on success) fire the relay.
//!
//! The tracker only changes after a definitive comparison, so a storage error
//! never counts as a failed attempt.

use crate::gate::{
    attempts::{AttemptGate, AttemptTracker, FailureOutcome},
    relay::{RelayNotifier, RelayOutcome},
    store::PasscodeStore,
};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

/// Matches the `VARCHAR(10)` column in `sql/schema.sql`.
pub const MAX_PASSCODE_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("No passcode found")]
    NotFound,
    #[error("Internal server error")]
    Internal,
}

/// Why the door did not open even though the passcode was right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    Rejected(String),
    Unreachable(String),
}

impl RelayFailure {
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Rejected(detail) | Self::Unreachable(detail) => detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    GrantedButRelayFailed(RelayFailure),
    Denied { remaining_attempts: u32 },
    /// Wrong code, and this failure started a lockout.
    DeniedLocked,
    Locked { retry_after: Duration },
}

pub(crate) fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[derive(Clone)]
pub struct VerificationService {
    tracker: Arc<AttemptTracker>,
    store: Arc<dyn PasscodeStore>,
    relay: Arc<dyn RelayNotifier>,
}

impl VerificationService {
    #[must_use]
    pub fn new(
        tracker: Arc<AttemptTracker>,
        store: Arc<dyn PasscodeStore>,
        relay: Arc<dyn RelayNotifier>,
    ) -> Self {
        Self {
            tracker,
            store,
            relay,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<AttemptTracker> {
        &self.tracker
    }

    /// Check `code` for `client_key` and open the door on a match.
    ///
    /// # Errors
    /// `BadRequest` for an empty code, `NotFound` if no passcode is configured,
    /// `Internal` if the store cannot be read.
    #[instrument(skip(self, code))]
    pub async fn verify(&self, client_key: &str, code: &str) -> Result<Verdict, GateError> {
        if code.is_empty() {
            return Err(GateError::BadRequest("Passcode is required"));
        }

        if let AttemptGate::Locked { retry_after } =
            self.tracker.check(client_key, Instant::now()).await
        {
            return Ok(Verdict::Locked { retry_after });
        }

        let record = self
            .store
            .latest()
            .await
            .map_err(|err| {
                error!("Failed to read passcode: {err}");
                GateError::Internal
            })?
            .ok_or(GateError::NotFound)?;

        if !secrets_match(code, &record.code) {
            let outcome = self
                .tracker
                .record_failure(client_key, Instant::now())
                .await;
            return Ok(match outcome {
                FailureOutcome::Denied { remaining_attempts } => {
                    info!(remaining_attempts, "access denied");
                    Verdict::Denied { remaining_attempts }
                }
                FailureOutcome::LockedOut => Verdict::DeniedLocked,
                FailureOutcome::AlreadyLocked { retry_after } => Verdict::Locked { retry_after },
            });
        }

        // The code was right regardless of what the relay does next.
        self.tracker.record_success(client_key).await;
        info!("access granted");

        Ok(match self.relay.notify().await {
            RelayOutcome::Success => Verdict::Granted,
            RelayOutcome::RelayRejected(detail) => {
                warn!("door relay rejected the request");
                Verdict::GrantedButRelayFailed(RelayFailure::Rejected(detail))
            }
            RelayOutcome::RelayUnreachable(detail) => {
                warn!("door relay unreachable");
                Verdict::GrantedButRelayFailed(RelayFailure::Unreachable(detail))
            }
        })
    }
}

#[derive(Clone)]
pub struct AdminService {
    admin_secret: SecretString,
    store: Arc<dyn PasscodeStore>,
}

impl AdminService {
    #[must_use]
    pub fn new(admin_secret: SecretString, store: Arc<dyn PasscodeStore>) -> Self {
        Self {
            admin_secret,
            store,
        }
    }

    /// Replace the active passcode. Does not reset any attempt history.
    ///
    /// # Errors
    /// `Unauthorized` if `provided_secret` is missing or wrong, `BadRequest` for an
    /// empty code, `Internal` if the store write fails.
    #[instrument(skip_all)]
    pub async fn set_passcode(
        &self,
        provided_secret: Option<&str>,
        code: &str,
    ) -> Result<(), GateError> {
        let authorized = provided_secret
            .is_some_and(|secret| secrets_match(secret, self.admin_secret.expose_secret()));
        if !authorized {
            warn!("rejected passcode update with invalid admin secret");
            return Err(GateError::Unauthorized);
        }

        if code.is_empty() {
            return Err(GateError::BadRequest("Passcode is required"));
        }
        if code.chars().count() > MAX_PASSCODE_LEN {
            return Err(GateError::BadRequest("Passcode must be at most 10 characters"));
        }

        self.store.replace(code).await.map_err(|err| {
            error!("Failed to replace passcode: {err}");
            GateError::Internal
        })?;

        info!("passcode updated");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::gate::{
        relay::{RelayNotifier, RelayOutcome},
        store::{PasscodeRecord, PasscodeStore, StoreError},
    };
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        records: Mutex<Vec<PasscodeRecord>>,
        failing: AtomicBool,
        pub reads: AtomicUsize,
    }

    impl MemoryStore {
        pub fn with_code(code: &str) -> Self {
            let store = Self::default();
            store.records.lock().unwrap().push(PasscodeRecord {
                code: code.to_string(),
                set_date: chrono::Local::now().date_naive(),
            });
            store
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn records(&self) -> Vec<PasscodeRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PasscodeStore for MemoryStore {
        async fn replace(&self, code: &str) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let mut records = self.records.lock().unwrap();
            records.clear();
            records.push(PasscodeRecord {
                code: code.to_string(),
                set_date: chrono::Local::now().date_naive(),
            });
            Ok(())
        }

        async fn latest(&self) -> Result<Option<PasscodeRecord>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(self.records.lock().unwrap().last().cloned())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    pub struct ScriptedRelay {
        outcome: Mutex<RelayOutcome>,
        pub calls: AtomicUsize,
    }

    impl ScriptedRelay {
        pub fn new(outcome: RelayOutcome) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(RelayOutcome::Success)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RelayNotifier for ScriptedRelay {
        async fn notify(&self) -> RelayOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.lock().unwrap().clone()
        }
    }
}
