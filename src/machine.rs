//! Authentication state machine.
//!
//! ```text
//! NotAuthenticated -> Authenticated -> { Expired, LoggedOut } -> NotAuthenticated
//!          \________________ LockedOut (after max failures) ________/
//! ```
//!
//! Session and lockout state are immutable snapshots swapped under one
//! mutex. Deadlines are passive: every entry point compares them against the
//! clock before acting, so a suspended app that never ran a timer still
//! observes expiry and lockout release correctly.
//!
//! The failure counter and lockout deadline are mirrored to the credential
//! store so a restart does not reset them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditTrail};
use crate::clock::Clock;
use crate::config::SecurityConfig;
use crate::error::Result;
use crate::gate::{AuthGate, GateOutcome};
use crate::session::{AuthResult, AuthSession, AuthState, LockoutState};
use crate::store::{self, names, CredentialStore};

#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    session: AuthSession,
    lockout: LockoutState,
    /// The last session ended by timing out rather than by logout.
    expired: bool,
}

/// Clears the in-flight flag when an attempt finishes, even by panic.
struct AttemptGuard<'a>(&'a AtomicBool);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AuthStateMachine {
    gate: Arc<dyn AuthGate>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: SecurityConfig,
    audit: AuditTrail,
    snapshot: Mutex<Snapshot>,
    in_flight: AtomicBool,
}

impl AuthStateMachine {
    /// Build the machine, restoring any persisted failure count and lockout
    /// deadline. Sessions are never restored: a restart requires a prompt.
    pub fn new(
        gate: Arc<dyn AuthGate>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
        audit: AuditTrail,
    ) -> Result<Self> {
        config.validate()?;

        let now = clock.now();
        let lockout = Self::restore_lockout(store.as_ref(), &config, now);
        if lockout.is_locked_out {
            info!(failed_attempts = lockout.failed_attempts, "restored active lockout");
        }

        let machine = Self {
            gate,
            store,
            clock,
            config,
            audit,
            snapshot: Mutex::new(Snapshot {
                lockout,
                ..Snapshot::default()
            }),
            in_flight: AtomicBool::new(false),
        };
        machine.persist_lockout(&lockout);
        Ok(machine)
    }

    fn restore_lockout(
        store: &dyn CredentialStore,
        config: &SecurityConfig,
        now: DateTime<Utc>,
    ) -> LockoutState {
        let failed_attempts = store::get_u32(store, names::FAILED_ATTEMPTS).unwrap_or(0);
        let until = store::get_i64(store, names::LOCKOUT_UNTIL)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        if failed_attempts < config.max_failed_attempts {
            return LockoutState {
                failed_attempts,
                ..LockoutState::default()
            };
        }

        // Over the threshold but the deadline was lost: start a fresh window.
        // A stored deadline never extends past one window from now.
        let cap = now + config.lockout_duration();
        let until = until.map_or(cap, |until| until.min(cap));
        LockoutState {
            failed_attempts,
            is_locked_out: true,
            lockout_expires_at: Some(until),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply passive deadlines: release an elapsed lockout and end an idle
    /// session.
    fn settle(&self, snap: &mut Snapshot, now: DateTime<Utc>) {
        // A clock that moved backwards cannot stretch the window.
        let cap = now + self.config.lockout_duration();
        if let Some(until) = snap.lockout.lockout_expires_at.filter(|until| *until > cap) {
            warn!(%until, %cap, "lockout deadline beyond one window; clamping");
            snap.lockout.lockout_expires_at = Some(cap);
            self.persist_lockout(&snap.lockout);
        }

        if snap.lockout.is_locked_out && !snap.lockout.is_active_at(now) {
            snap.lockout = LockoutState::default();
            self.persist_lockout(&snap.lockout);
            info!("lockout window elapsed");
            self.audit.record(AuditEvent::LockoutExpired);
        }

        let timeout = self.config.auto_lock_timeout();
        if snap.session.is_authenticated && !snap.session.is_valid_at(now, timeout) {
            snap.session = AuthSession::default();
            snap.expired = true;
            info!("session auto-locked");
            self.audit.record(AuditEvent::SessionExpired);
        }
    }

    fn settled(&self) -> MutexGuard<'_, Snapshot> {
        let now = self.clock.now();
        let mut snap = self.lock();
        self.settle(&mut snap, now);
        snap
    }

    fn persist_lockout(&self, lockout: &LockoutState) {
        let ok = if lockout.failed_attempts == 0 {
            self.store.delete(names::FAILED_ATTEMPTS) & self.store.delete(names::LOCKOUT_UNTIL)
        } else {
            let counter = store::set_u32(self.store.as_ref(), names::FAILED_ATTEMPTS, lockout.failed_attempts);
            let deadline = match lockout.lockout_expires_at {
                Some(until) => store::set_i64(self.store.as_ref(), names::LOCKOUT_UNTIL, until.timestamp_millis()),
                None => self.store.delete(names::LOCKOUT_UNTIL),
            };
            counter & deadline
        };
        if !ok {
            warn!("credential store refused lockout state update");
        }
    }

    /// Prompt the user through the gate.
    ///
    /// Rejected without prompting while locked out or while another attempt
    /// is in flight. This is the only call that blocks: it waits for the
    /// user. A cancelled prompt is an ordinary failure.
    pub fn authenticate(&self, reason: &str) -> AuthResult {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("authentication already in progress");
            return AuthResult::Busy;
        }
        let _attempt = AttemptGuard(&self.in_flight);

        {
            let now = self.clock.now();
            let snap = self.settled();
            if let Some(retry_after) = snap.lockout.remaining_at(now) {
                warn!(retry_after_secs = retry_after.as_secs(), "attempt rejected during lockout");
                self.audit.record(AuditEvent::AuthRejectedLocked);
                return AuthResult::LockedOut { retry_after };
            }
        }

        // The mutex is not held across the prompt.
        let outcome = self.gate.authenticate(reason);

        let now = self.clock.now();
        let mut snap = self.lock();
        self.settle(&mut snap, now);

        match outcome {
            GateOutcome::Granted(method) => {
                snap.lockout = LockoutState::default();
                snap.session = AuthSession::opened(method, now);
                snap.expired = false;
                self.persist_lockout(&snap.lockout);
                if !store::set_i64(self.store.as_ref(), names::LAST_AUTH_TIME, now.timestamp_millis()) {
                    warn!("credential store refused last-auth-time update");
                }
                info!(?method, "authenticated");
                self.audit.record(AuditEvent::AuthSucceeded { method });
                AuthResult::Authenticated(method)
            }
            GateOutcome::Denied => {
                let failed_attempts = snap.lockout.failed_attempts.saturating_add(1);
                let max = self.config.max_failed_attempts;
                snap.lockout.failed_attempts = failed_attempts;

                if failed_attempts >= max {
                    let duration = self.config.lockout_duration();
                    snap.lockout.is_locked_out = true;
                    snap.lockout.lockout_expires_at = Some(now + duration);
                    snap.session = AuthSession::default();
                    warn!(failed_attempts, lockout_secs = duration.num_seconds(), "locked out");
                    self.audit.record(AuditEvent::LockedOut {
                        failed_attempts,
                        lockout_secs: duration.num_seconds(),
                    });
                } else {
                    warn!(failed_attempts, "authentication failed");
                    self.audit.record(AuditEvent::AuthFailed { failed_attempts });
                }
                self.persist_lockout(&snap.lockout);
                AuthResult::Failed {
                    remaining_attempts: max.saturating_sub(failed_attempts),
                }
            }
            GateOutcome::Unavailable => {
                self.audit.record(AuditEvent::GateUnavailable);
                AuthResult::GateUnavailable
            }
        }
    }

    /// True iff a session is open and has not idled past the auto-lock
    /// timeout. Re-evaluated against the clock on every call.
    pub fn is_session_valid(&self) -> bool {
        self.settled().session.is_authenticated
    }

    /// Extend an open session to `now`. Returns false (and does nothing)
    /// when no valid session exists.
    pub fn refresh(&self) -> bool {
        if self.touch() {
            self.audit.record(AuditEvent::SessionRefreshed);
            true
        } else {
            false
        }
    }

    /// Unaudited refresh used by gated operations.
    pub(crate) fn touch(&self) -> bool {
        let now = self.clock.now();
        let mut snap = self.lock();
        self.settle(&mut snap, now);
        if !snap.session.is_authenticated {
            return false;
        }
        snap.session.last_refreshed_at = Some(now);
        debug!("session refreshed");
        true
    }

    /// End the session unconditionally.
    pub fn logout(&self) {
        let mut snap = self.lock();
        snap.session = AuthSession::default();
        snap.expired = false;
        info!("logged out");
        self.audit.record(AuditEvent::LoggedOut);
    }

    pub fn state(&self) -> AuthState {
        let now = self.clock.now();
        let snap = self.settled();
        if snap.lockout.is_active_at(now) {
            AuthState::LockedOut
        } else if snap.session.is_authenticated {
            AuthState::Authenticated
        } else if snap.expired {
            AuthState::Expired
        } else {
            AuthState::NotAuthenticated
        }
    }

    pub fn session(&self) -> AuthSession {
        self.settled().session
    }

    pub fn lockout(&self) -> LockoutState {
        self.settled().lockout
    }

    pub fn is_locked_out(&self) -> bool {
        self.settled().lockout.is_locked_out
    }

    /// Countdown for the lockout window, if one is open.
    pub fn remaining_lockout(&self) -> Option<StdDuration> {
        let now = self.clock.now();
        self.settled().lockout.remaining_at(now)
    }

    /// Failures still allowed before lockout.
    pub fn remaining_attempts(&self) -> u32 {
        let snap = self.settled();
        if snap.lockout.is_locked_out {
            return 0;
        }
        self.config
            .max_failed_attempts
            .saturating_sub(snap.lockout.failed_attempts)
    }

    /// Last successful authentication, as persisted in the credential store.
    pub fn last_authenticated_at(&self) -> Option<DateTime<Utc>> {
        store::get_i64(self.store.as_ref(), names::LAST_AUTH_TIME)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    pub fn gate_available(&self) -> bool {
        self.gate.is_available()
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }
}
