//! Security policy settings.
//!
//! Plain numeric values fixed at construction. Missing fields in a JSON
//! document fall back to the defaults.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum failed attempts before lockout.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Default lockout window (5 minutes).
pub const DEFAULT_LOCKOUT_SECS: u64 = 300;

/// Default idle time before a session auto-locks (5 minutes).
pub const DEFAULT_AUTO_LOCK_SECS: u64 = 300;

/// Upper bound for either window (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Consecutive failures that open a lockout window.
    pub max_failed_attempts: u32,
    /// Length of the lockout window in seconds.
    pub lockout_duration_secs: u64,
    /// Idle seconds after which a session is no longer valid.
    pub auto_lock_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration_secs: DEFAULT_LOCKOUT_SECS,
            auto_lock_timeout_secs: DEFAULT_AUTO_LOCK_SECS,
        }
    }
}

impl SecurityConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn with_auto_lock_timeout(mut self, secs: u64) -> Self {
        self.auto_lock_timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_failed_attempts == 0 {
            return Err(Error::Config("max_failed_attempts must be at least 1".into()));
        }
        if self.lockout_duration_secs == 0 {
            return Err(Error::Config("lockout_duration_secs must be non-zero".into()));
        }
        if self.auto_lock_timeout_secs == 0 {
            return Err(Error::Config("auto_lock_timeout_secs must be non-zero".into()));
        }
        // Deadlines are computed as `now + window`, which panics on overflow.
        if self.lockout_duration_secs > MAX_WINDOW_SECS || self.auto_lock_timeout_secs > MAX_WINDOW_SECS {
            return Err(Error::Config("duration out of range".into()));
        }
        Ok(())
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_secs as i64)
    }

    pub fn auto_lock_timeout(&self) -> Duration {
        Duration::seconds(self.auto_lock_timeout_secs as i64)
    }
}
