//! Brute-force throttling for unlock attempts.
//!
//! Five consecutive failures trigger a 30-second lockout. The counter and
//! deadline are persisted so restarting the process does not reset the
//! window. Time is injected as epoch seconds, which keeps the guard
//! deterministic under test.
//!
//! Persistence here is best-effort: a disk hiccup must not let an attacker
//! bypass throttling, so the in-memory state always advances and a failed
//! flush is only logged.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::KeystoreError;
use crate::storage::{LocalStore, Namespace};

/// Consecutive failures allowed before the lockout triggers.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Length of the lockout window in seconds.
pub const LOCKOUT_DURATION_SECS: u64 = 30;

const LOCKOUT_FIELD: &str = "lockout";

/// Persisted attempt-accounting state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockoutState {
    /// Consecutive failed attempts since the last success or expiry.
    failed_attempts: u32,
    /// Epoch-seconds deadline while a lockout is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until: Option<u64>,
}

/// Attempt counter and lockout window for one namespace.
pub struct LockoutGuard {
    state: LockoutState,
}

impl LockoutGuard {
    /// Load persisted state for `ns`, or start fresh.
    ///
    /// An unreadable record is treated as fresh state with a warning — a
    /// corrupt lockout blob must not brick unlocking forever.
    #[must_use]
    pub fn load(store: &LocalStore, ns: &Namespace) -> Self {
        let state = match store.get(ns, LOCKOUT_FIELD) {
            None => LockoutState::default(),
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                warn!(error = %e, "unreadable lockout state, starting fresh");
                LockoutState::default()
            }),
        };
        Self { state }
    }

    /// Whether a lockout window is currently active.
    #[must_use]
    pub fn is_locked(&self, now: u64) -> bool {
        self.state.locked_until.is_some_and(|until| now < until)
    }

    /// Attempts left before the lockout triggers.
    #[must_use]
    pub fn attempts_remaining(&self) -> u32 {
        MAX_FAILED_ATTEMPTS.saturating_sub(self.state.failed_attempts)
    }

    /// Seconds left in an active window, or `None` when not locked.
    #[must_use]
    pub fn remaining_secs(&self, now: u64) -> Option<u64> {
        self.state
            .locked_until
            .and_then(|until| until.checked_sub(now))
            .filter(|remaining| *remaining > 0)
    }

    /// Gate an unlock attempt.
    ///
    /// Inside an active window this fails with [`KeystoreError::Locked`]
    /// carrying the remaining seconds. An expired window clears the counter
    /// so the caller gets a full attempt budget back.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Locked`] while the window is active.
    pub fn check(
        &mut self,
        store: &mut LocalStore,
        ns: &Namespace,
        now: u64,
    ) -> Result<(), KeystoreError> {
        match self.state.locked_until {
            Some(until) if now < until => Err(KeystoreError::Locked {
                remaining_secs: until.saturating_sub(now),
            }),
            Some(_) => {
                // Window elapsed: full budget again.
                self.state = LockoutState::default();
                self.persist(store, ns);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record a failed attempt and return the error the caller should
    /// surface: [`KeystoreError::WrongSecret`] while budget remains, or
    /// [`KeystoreError::Locked`] once the window starts.
    pub fn record_failure(
        &mut self,
        store: &mut LocalStore,
        ns: &Namespace,
        now: u64,
    ) -> KeystoreError {
        self.state.failed_attempts = self.state.failed_attempts.saturating_add(1);

        let err = if self.state.failed_attempts >= MAX_FAILED_ATTEMPTS {
            let until = now.saturating_add(LOCKOUT_DURATION_SECS);
            self.state.locked_until = Some(until);
            KeystoreError::Locked {
                remaining_secs: LOCKOUT_DURATION_SECS,
            }
        } else {
            KeystoreError::WrongSecret {
                attempts_remaining: self.attempts_remaining(),
            }
        };

        self.persist(store, ns);
        err
    }

    /// Clear the counter after a successful unlock.
    pub fn record_success(&mut self, store: &mut LocalStore, ns: &Namespace) {
        if self.state != LockoutState::default() {
            self.state = LockoutState::default();
            self.persist(store, ns);
        }
    }

    /// Best-effort flush of the current state. In-memory accounting is
    /// authoritative for this process; a failed write only loses the
    /// cross-restart guarantee.
    fn persist(&self, store: &mut LocalStore, ns: &Namespace) {
        let json = match serde_json::to_string(&self.state) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize lockout state");
                return;
            }
        };
        if let Err(e) = store.set(ns, LOCKOUT_FIELD, json) {
            warn!(error = %e, "failed to persist lockout state");
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: u64 = 1_700_000_000;

    fn open(dir: &TempDir) -> LocalStore {
        LocalStore::open(dir.path()).unwrap()
    }

    #[test]
    fn fresh_guard_allows_attempts() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;

        let mut guard = LockoutGuard::load(&store, &ns);
        assert!(guard.check(&mut store, &ns, NOW).is_ok());
        assert_eq!(guard.attempts_remaining(), MAX_FAILED_ATTEMPTS);
    }

    #[test]
    fn failures_count_down_then_lock() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;
        let mut guard = LockoutGuard::load(&store, &ns);

        for expected_remaining in (1..MAX_FAILED_ATTEMPTS).rev() {
            let err = guard.record_failure(&mut store, &ns, NOW);
            match err {
                KeystoreError::WrongSecret { attempts_remaining } => {
                    assert_eq!(attempts_remaining, expected_remaining);
                }
                other => panic!("expected WrongSecret, got {other:?}"),
            }
        }

        // Fifth failure starts the window.
        let err = guard.record_failure(&mut store, &ns, NOW);
        assert!(matches!(
            err,
            KeystoreError::Locked {
                remaining_secs: LOCKOUT_DURATION_SECS
            }
        ));
        assert!(guard.is_locked(NOW));
    }

    #[test]
    fn check_rejects_while_window_active() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;
        let mut guard = LockoutGuard::load(&store, &ns);

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = guard.record_failure(&mut store, &ns, NOW);
        }

        let err = guard.check(&mut store, &ns, NOW + 10).expect_err("locked");
        assert!(matches!(err, KeystoreError::Locked { remaining_secs: 20 }));
    }

    #[test]
    fn window_expiry_restores_full_budget() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;
        let mut guard = LockoutGuard::load(&store, &ns);

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = guard.record_failure(&mut store, &ns, NOW);
        }

        let after = NOW + LOCKOUT_DURATION_SECS;
        assert!(guard.check(&mut store, &ns, after).is_ok());
        assert_eq!(guard.attempts_remaining(), MAX_FAILED_ATTEMPTS);
    }

    #[test]
    fn state_survives_reload() {
        let dir = TempDir::new().unwrap();
        let ns = Namespace::Local;
        {
            let mut store = open(&dir);
            let mut guard = LockoutGuard::load(&store, &ns);
            for _ in 0..MAX_FAILED_ATTEMPTS {
                let _ = guard.record_failure(&mut store, &ns, NOW);
            }
        }

        // New store + guard over the same directory, as after a restart.
        let mut store = open(&dir);
        let mut guard = LockoutGuard::load(&store, &ns);
        assert!(guard.is_locked(NOW + 5));
        let err = guard.check(&mut store, &ns, NOW + 5).expect_err("locked");
        assert!(matches!(err, KeystoreError::Locked { .. }));
    }

    #[test]
    fn success_clears_counter() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;
        let mut guard = LockoutGuard::load(&store, &ns);

        let _ = guard.record_failure(&mut store, &ns, NOW);
        let _ = guard.record_failure(&mut store, &ns, NOW);
        guard.record_success(&mut store, &ns);

        assert_eq!(guard.attempts_remaining(), MAX_FAILED_ATTEMPTS);
        // Persisted too.
        let reloaded = LockoutGuard::load(&store, &ns);
        assert_eq!(reloaded.attempts_remaining(), MAX_FAILED_ATTEMPTS);
    }

    #[test]
    fn corrupt_state_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let ns = Namespace::Local;
        store.set(&ns, "lockout", "not json".into()).unwrap();

        let guard = LockoutGuard::load(&store, &ns);
        assert_eq!(guard.attempts_remaining(), MAX_FAILED_ATTEMPTS);
        assert!(!guard.is_locked(NOW));
    }

    #[test]
    fn namespaces_have_independent_counters() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let local = Namespace::Local;
        let account = Namespace::Account("alice".into());

        let mut local_guard = LockoutGuard::load(&store, &local);
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = local_guard.record_failure(&mut store, &local, NOW);
        }

        let account_guard = LockoutGuard::load(&store, &account);
        assert!(!account_guard.is_locked(NOW));
        assert_eq!(account_guard.attempts_remaining(), MAX_FAILED_ATTEMPTS);
    }
}
