//! Authentication state as immutable value snapshots.
//!
//! The state machine swaps whole snapshots under a single mutex; callers only
//! ever see copies.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How a session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Biometric,
    Passcode,
    #[default]
    None,
}

/// A prior successful authentication that has not yet been ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSession {
    pub is_authenticated: bool,
    pub method: AuthMethod,
    pub started_at: Option<DateTime<Utc>>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub(crate) fn opened(method: AuthMethod, now: DateTime<Utc>) -> Self {
        Self {
            is_authenticated: true,
            method,
            started_at: Some(now),
            last_refreshed_at: Some(now),
        }
    }

    /// Valid iff authenticated and `0 <= now - last_refreshed_at < timeout`.
    ///
    /// A clock that reads earlier than the last refresh invalidates the
    /// session rather than extending it.
    pub fn is_valid_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (self.is_authenticated, self.last_refreshed_at) {
            (true, Some(refreshed)) => {
                let idle = now - refreshed;
                idle >= Duration::zero() && idle < timeout
            }
            _ => false,
        }
    }

    /// When the session stops being valid, if it is open.
    pub fn expires_at(&self, timeout: Duration) -> Option<DateTime<Utc>> {
        if !self.is_authenticated {
            return None;
        }
        self.last_refreshed_at.map(|t| t + timeout)
    }
}

/// Failure counter and lockout window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub is_locked_out: bool,
    pub lockout_expires_at: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// True while a lockout window is open at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_locked_out && self.lockout_expires_at.is_some_and(|until| now < until)
    }

    /// Time left in the lockout window, if one is open.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<StdDuration> {
        if !self.is_active_at(now) {
            return None;
        }
        self.lockout_expires_at
            .and_then(|until| (until - now).to_std().ok())
    }
}

/// Coarse state of the machine at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotAuthenticated,
    Authenticated,
    /// A session was open but its auto-lock deadline has passed.
    Expired,
    LockedOut,
}

/// Outcome of one `authenticate()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    /// The gate granted access and a session is open.
    Authenticated(AuthMethod),
    /// The gate denied access; `remaining_attempts` more failures are allowed
    /// before lockout.
    Failed { remaining_attempts: u32 },
    /// Rejected without consulting the gate.
    LockedOut { retry_after: StdDuration },
    /// Neither biometrics nor a device passcode are configured.
    GateUnavailable,
    /// Another attempt is already waiting on the prompt.
    Busy,
}

impl AuthResult {
    /// The boolean the authentication boundary exposes.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<AuthResult> for bool {
    fn from(result: AuthResult) -> Self {
        result.is_success()
    }
}
