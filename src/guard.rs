//! The data guard: one object wiring the gate, state machine, key manager,
//! and encryption engine together.
//!
//! Construct it once at process start and pass it by reference. Data and key
//! operations re-check the session against the clock on every call. Without a
//! live session they fail with [`Error::LockedOut`] during a lockout window,
//! [`Error::GateUnavailable`] when the device has no way to authenticate, and
//! [`Error::Locked`] otherwise.

use std::sync::Arc;

use crate::audit::AuditTrail;
use crate::clock::{Clock, SystemClock};
use crate::config::SecurityConfig;
use crate::engine::EncryptionEngine;
use crate::error::{Error, Result};
use crate::gate::AuthGate;
use crate::keys::KeyManager;
use crate::machine::AuthStateMachine;
use crate::posture::{PostureInputs, SecurityPosture};
use crate::session::AuthResult;
use crate::store::{names, CredentialStore};

pub struct DataGuard {
    store: Arc<dyn CredentialStore>,
    keys: Arc<KeyManager>,
    engine: EncryptionEngine,
    machine: AuthStateMachine,
    audit: AuditTrail,
}

impl DataGuard {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        gate: Arc<dyn AuthGate>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
    ) -> Result<Self> {
        let audit = AuditTrail::new(Arc::clone(&clock));
        let keys = Arc::new(KeyManager::new(Arc::clone(&store), audit.clone()));
        let engine = EncryptionEngine::new(Arc::clone(&keys), audit.clone());
        let machine = AuthStateMachine::new(gate, Arc::clone(&store), clock, config, audit.clone())?;

        Ok(Self {
            store,
            keys,
            engine,
            machine,
            audit,
        })
    }

    /// Same as [`new`](Self::new) with the system clock.
    pub fn with_system_clock(
        store: Arc<dyn CredentialStore>,
        gate: Arc<dyn AuthGate>,
        config: SecurityConfig,
    ) -> Result<Self> {
        Self::new(store, gate, Arc::new(SystemClock), config)
    }

    /// Refresh the live session or report why there is none.
    fn require_session(&self) -> Result<()> {
        if self.machine.touch() {
            return Ok(());
        }
        if let Some(retry_after) = self.machine.remaining_lockout() {
            return Err(Error::LockedOut { retry_after });
        }
        if !self.machine.gate_available() {
            return Err(Error::GateUnavailable);
        }
        Err(Error::Locked)
    }

    // -- authentication ------------------------------------------------------

    pub fn authenticate(&self, reason: &str) -> AuthResult {
        self.machine.authenticate(reason)
    }

    pub fn is_session_valid(&self) -> bool {
        self.machine.is_session_valid()
    }

    pub fn refresh(&self) -> bool {
        self.machine.refresh()
    }

    pub fn logout(&self) {
        self.machine.logout()
    }

    // -- data ----------------------------------------------------------------

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.require_session()?;
        self.engine.encrypt(plaintext)
    }

    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.require_session()?;
        self.engine.decrypt(envelope)
    }

    pub fn encrypt_string(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.require_session()?;
        self.engine.encrypt_string(plaintext)
    }

    pub fn decrypt_string(&self, envelope: &[u8]) -> Result<String> {
        self.require_session()?;
        self.engine.decrypt_string(envelope)
    }

    // -- key lifecycle -------------------------------------------------------

    /// Destructive rotation. See [`KeyManager::rotate`].
    pub fn rotate_key(&self) -> Result<()> {
        self.require_session()?;
        self.keys.rotate()
    }

    /// All-or-nothing rotation. See [`EncryptionEngine::rotate_reencrypting`].
    pub fn rotate_key_reencrypting(&self, envelopes: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.require_session()?;
        self.engine.rotate_reencrypting(envelopes)
    }

    /// Delete the master key. Existing ciphertexts become unreadable.
    pub fn wipe(&self) -> Result<()> {
        self.require_session()?;
        self.keys.wipe()
    }

    // -- consent & diagnostics -----------------------------------------------

    pub fn record_consent(&self, granted: bool) -> bool {
        if granted {
            self.store.set(names::PRIVACY_CONSENT, &[1])
        } else {
            self.store.delete(names::PRIVACY_CONSENT)
        }
    }

    pub fn consent_valid(&self) -> bool {
        matches!(self.store.get(names::PRIVACY_CONSENT).as_deref(), Some([1]))
    }

    pub fn security_posture(&self) -> SecurityPosture {
        SecurityPosture::evaluate(&PostureInputs {
            biometric_available: self.machine.gate_available(),
            encryption_configured: self.keys.has_master_key(),
            consent_valid: self.consent_valid(),
            auto_lock_timeout_secs: self.machine.config().auto_lock_timeout_secs,
        })
    }

    pub fn machine(&self) -> &AuthStateMachine {
        &self.machine
    }

    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gate::testing::{AlwaysDeny, AlwaysGrant, ScriptedPrompt};
    use crate::gate::{BiometricGate, PromptCapability};
    use crate::store::MemoryCredentialStore;

    fn guard() -> (Arc<ManualClock>, DataGuard) {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = DataGuard::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(AlwaysGrant::default()),
            clock.clone(),
            SecurityConfig::default(),
        )
        .unwrap();
        (clock, guard)
    }

    #[test]
    fn test_data_requires_session() {
        let (_, guard) = guard();
        assert!(matches!(guard.encrypt(b"x"), Err(Error::Locked)));
        assert!(matches!(guard.rotate_key(), Err(Error::Locked)));

        assert!(guard.authenticate("unlock").is_success());
        let sealed = guard.encrypt_string("hello").unwrap();
        assert_eq!(guard.decrypt_string(&sealed).unwrap(), "hello");
    }

    #[test]
    fn test_gated_calls_keep_session_alive() {
        let (clock, guard) = guard();
        guard.authenticate("unlock");
        for _ in 0..4 {
            clock.advance(chrono::Duration::seconds(200));
            guard.encrypt(b"tick").unwrap();
        }
        assert!(guard.is_session_valid());
    }

    #[test]
    fn test_gated_call_reports_lockout() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = DataGuard::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(AlwaysDeny::new()),
            clock.clone(),
            SecurityConfig::default(),
        )
        .unwrap();

        guard.authenticate("unlock");
        assert!(matches!(guard.encrypt(b"x"), Err(Error::Locked)));

        for _ in 0..4 {
            guard.authenticate("unlock");
        }
        clock.advance(chrono::Duration::seconds(100));
        match guard.decrypt(&[0u8; 40]) {
            Err(Error::LockedOut { retry_after }) => {
                assert_eq!(retry_after, std::time::Duration::from_secs(200))
            }
            other => panic!("expected lockout, got {other:?}"),
        }

        clock.advance(chrono::Duration::seconds(200));
        assert!(matches!(guard.encrypt(b"x"), Err(Error::Locked)));
    }

    #[test]
    fn test_gated_call_reports_missing_gate() {
        let prompt = Arc::new(ScriptedPrompt::new(PromptCapability::default()));
        let guard = DataGuard::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(BiometricGate::new(prompt)),
            Arc::new(ManualClock::starting_now()),
            SecurityConfig::default(),
        )
        .unwrap();

        assert_eq!(guard.authenticate("unlock"), AuthResult::GateUnavailable);
        assert!(matches!(guard.encrypt_string("x"), Err(Error::GateUnavailable)));
        assert!(matches!(guard.wipe(), Err(Error::GateUnavailable)));
    }

    #[test]
    fn test_consent_flag() {
        let (_, guard) = guard();
        assert!(!guard.consent_valid());
        assert!(guard.record_consent(true));
        assert!(guard.consent_valid());
        assert!(guard.record_consent(false));
        assert!(!guard.consent_valid());
    }
}
