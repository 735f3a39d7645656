//! Security posture evaluation.
//!
//! A read-only score for diagnostics screens. Four independent contributions
//! of 25 points each, mapped onto four tiers. Nothing here has side effects.

use serde::{Deserialize, Serialize};

/// Points for each satisfied contribution.
const CONTRIBUTION: u8 = 25;

/// Longest auto-lock timeout that still counts as "auto-lock enabled".
pub const MAX_RECOMMENDED_AUTO_LOCK_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    Low,
    Medium,
    High,
    Excellent,
}

impl SecurityTier {
    /// Breakpoints: 0-25 low, 26-50 medium, 51-75 high, 76-100 excellent.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=25 => Self::Low,
            26..=50 => Self::Medium,
            51..=75 => Self::High,
            _ => Self::Excellent,
        }
    }
}

/// Raw facts gathered from the gate, key manager, and settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostureInputs {
    pub biometric_available: bool,
    pub encryption_configured: bool,
    pub consent_valid: bool,
    pub auto_lock_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPosture {
    pub biometric_available: bool,
    pub encryption_configured: bool,
    pub consent_valid: bool,
    pub auto_lock_enabled: bool,
    pub score: u8,
    pub tier: SecurityTier,
}

impl SecurityPosture {
    pub fn evaluate(inputs: &PostureInputs) -> Self {
        let auto_lock_enabled = inputs.auto_lock_timeout_secs > 0
            && inputs.auto_lock_timeout_secs <= MAX_RECOMMENDED_AUTO_LOCK_SECS;

        let score = [
            inputs.biometric_available,
            inputs.encryption_configured,
            inputs.consent_valid,
            auto_lock_enabled,
        ]
        .iter()
        .filter(|satisfied| **satisfied)
        .count() as u8
            * CONTRIBUTION;

        Self {
            biometric_available: inputs.biometric_available,
            encryption_configured: inputs.encryption_configured,
            consent_valid: inputs.consent_valid,
            auto_lock_enabled,
            score,
            tier: SecurityTier::from_score(score),
        }
    }

    /// Plain-language steps that would raise the score.
    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.biometric_available {
            out.push("Set up Face ID, Touch ID, or a device passcode to protect access.");
        }
        if !self.encryption_configured {
            out.push("Unlock once to create the encryption key for stored records.");
        }
        if !self.consent_valid {
            out.push("Review and accept the data protection terms.");
        }
        if !self.auto_lock_enabled {
            out.push("Set auto-lock to 15 minutes or less.");
        }
        out
    }
}
