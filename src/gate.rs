//! Biometric / passcode gate.
//!
//! Wraps the host's single prompt primitive: biometrics first, device
//! passcode as the fallback. Every platform error collapses to a denied
//! outcome plus a log line; the reason never reaches the caller.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::AuthMethod;

/// Which biometric sensor the device offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricKind {
    Face,
    Fingerprint,
    #[default]
    None,
}

/// What the host can currently offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromptCapability {
    pub biometric: BiometricKind,
    pub passcode_set: bool,
}

/// Which credential a prompt may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPolicy {
    /// Biometrics only; the prompt offers a "use passcode" button that
    /// reports [`PromptError::UserFallback`].
    Biometrics,
    /// Biometrics or the device passcode, whichever the user presents.
    DeviceOwner,
}

/// Why a prompt did not succeed. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    UserCancel,
    SystemCancel,
    UserFallback,
    AuthenticationFailed,
    BiometryLockout,
    BiometryNotAvailable,
    BiometryNotEnrolled,
    PasscodeNotSet,
    Other(String),
}

impl PromptError {
    /// Conditions after which the passcode is offered transparently.
    fn falls_back_to_passcode(&self) -> bool {
        matches!(
            self,
            Self::SystemCancel
                | Self::UserFallback
                | Self::BiometryLockout
                | Self::BiometryNotAvailable
                | Self::BiometryNotEnrolled
        )
    }
}

/// The host's prompt primitive. Blocks until the user answers.
pub trait PlatformPrompt: Send + Sync {
    fn capability(&self) -> PromptCapability;
    fn evaluate(&self, policy: PromptPolicy, reason: &str) -> Result<(), PromptError>;
}

/// Binary outcome of a gate prompt, carrying the method that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Granted(AuthMethod),
    Denied,
    /// No biometric and no passcode configured. Not a failed attempt.
    Unavailable,
}

impl GateOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// The capability-set seam the state machine drives.
pub trait AuthGate: Send + Sync {
    fn is_available(&self) -> bool;
    fn kind(&self) -> BiometricKind;
    fn authenticate(&self, reason: &str) -> GateOutcome;
}

#[derive(Debug, Clone, Copy, Default)]
struct GateState {
    available: bool,
    kind: BiometricKind,
    passcode_set: bool,
}

impl From<PromptCapability> for GateState {
    fn from(cap: PromptCapability) -> Self {
        Self {
            available: cap.biometric != BiometricKind::None || cap.passcode_set,
            kind: cap.biometric,
            passcode_set: cap.passcode_set,
        }
    }
}

/// The production gate over a [`PlatformPrompt`].
pub struct BiometricGate {
    prompt: Arc<dyn PlatformPrompt>,
    state: RwLock<GateState>,
}

impl BiometricGate {
    pub fn new(prompt: Arc<dyn PlatformPrompt>) -> Self {
        let state = GateState::from(prompt.capability());
        Self {
            prompt,
            state: RwLock::new(state),
        }
    }

    /// Re-query the platform. Enrollment can change while the app runs.
    pub fn refresh(&self) {
        let fresh = GateState::from(self.prompt.capability());
        debug!(available = fresh.available, kind = ?fresh.kind, "refreshed gate capability");
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    fn state(&self) -> GateState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn try_passcode(&self, reason: &str) -> GateOutcome {
        match self.prompt.evaluate(PromptPolicy::DeviceOwner, reason) {
            Ok(()) => {
                info!("passcode prompt granted");
                GateOutcome::Granted(AuthMethod::Passcode)
            }
            Err(e) => {
                warn!(reason = ?e, "passcode prompt denied");
                GateOutcome::Denied
            }
        }
    }
}

impl AuthGate for BiometricGate {
    fn is_available(&self) -> bool {
        self.state().available
    }

    fn kind(&self) -> BiometricKind {
        self.state().kind
    }

    fn authenticate(&self, reason: &str) -> GateOutcome {
        self.refresh();
        let state = self.state();

        if !state.available {
            warn!("no biometric or passcode configured");
            return GateOutcome::Unavailable;
        }

        if state.kind == BiometricKind::None {
            return self.try_passcode(reason);
        }

        match self.prompt.evaluate(PromptPolicy::Biometrics, reason) {
            Ok(()) => {
                info!(kind = ?state.kind, "biometric prompt granted");
                GateOutcome::Granted(AuthMethod::Biometric)
            }
            Err(e) if e.falls_back_to_passcode() && state.passcode_set => {
                debug!(reason = ?e, "biometric prompt fell back to passcode");
                self.try_passcode(reason)
            }
            Err(e) => {
                warn!(reason = ?e, "biometric prompt denied");
                GateOutcome::Denied
            }
        }
    }
}

/// Gate and prompt doubles for exercising the state machine without
/// biometric hardware.
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Grants every prompt with a fixed method.
    #[derive(Debug)]
    pub struct AlwaysGrant {
        method: AuthMethod,
        calls: AtomicUsize,
    }

    impl AlwaysGrant {
        pub fn new(method: AuthMethod) -> Self {
            Self {
                method,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Default for AlwaysGrant {
        fn default() -> Self {
            Self::new(AuthMethod::Biometric)
        }
    }

    impl AuthGate for AlwaysGrant {
        fn is_available(&self) -> bool {
            true
        }

        fn kind(&self) -> BiometricKind {
            BiometricKind::Face
        }

        fn authenticate(&self, _reason: &str) -> GateOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GateOutcome::Granted(self.method)
        }
    }

    /// Denies every prompt.
    #[derive(Debug, Default)]
    pub struct AlwaysDeny {
        calls: AtomicUsize,
    }

    impl AlwaysDeny {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AuthGate for AlwaysDeny {
        fn is_available(&self) -> bool {
            true
        }

        fn kind(&self) -> BiometricKind {
            BiometricKind::Face
        }

        fn authenticate(&self, _reason: &str) -> GateOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GateOutcome::Denied
        }
    }

    /// Replays queued outcomes, then denies.
    #[derive(Debug, Default)]
    pub struct ScriptedGate {
        outcomes: Mutex<VecDeque<GateOutcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedGate {
        pub fn new(outcomes: impl IntoIterator<Item = GateOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn push(&self, outcome: GateOutcome) {
            self.outcomes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(outcome);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AuthGate for ScriptedGate {
        fn is_available(&self) -> bool {
            true
        }

        fn kind(&self) -> BiometricKind {
            BiometricKind::Fingerprint
        }

        fn authenticate(&self, _reason: &str) -> GateOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or(GateOutcome::Denied)
        }
    }

    /// A platform prompt with a fixed capability that answers each policy
    /// from its own queue. Records every policy it was asked for.
    #[derive(Debug, Default)]
    pub struct ScriptedPrompt {
        capability: Mutex<PromptCapability>,
        biometric: Mutex<VecDeque<Result<(), PromptError>>>,
        passcode: Mutex<VecDeque<Result<(), PromptError>>>,
        asked: Mutex<Vec<PromptPolicy>>,
    }

    impl ScriptedPrompt {
        pub fn new(capability: PromptCapability) -> Self {
            Self {
                capability: Mutex::new(capability),
                ..Self::default()
            }
        }

        pub fn set_capability(&self, capability: PromptCapability) {
            *self.capability.lock().unwrap_or_else(|e| e.into_inner()) = capability;
        }

        pub fn on_biometric(&self, answer: Result<(), PromptError>) {
            self.biometric
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(answer);
        }

        pub fn on_passcode(&self, answer: Result<(), PromptError>) {
            self.passcode
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(answer);
        }

        pub fn asked(&self) -> Vec<PromptPolicy> {
            self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    impl PlatformPrompt for ScriptedPrompt {
        fn capability(&self) -> PromptCapability {
            *self.capability.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn evaluate(&self, policy: PromptPolicy, _reason: &str) -> Result<(), PromptError> {
            self.asked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(policy);
            let queue = match policy {
                PromptPolicy::Biometrics => &self.biometric,
                PromptPolicy::DeviceOwner => &self.passcode,
            };
            queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or(Err(PromptError::AuthenticationFailed))
        }
    }
}
