//! Credential store backed by the OS keychain.
//!
//! Uses the `keyring` crate: Keychain Services on macOS/iOS, Credential
//! Manager on Windows. Every entry lives under one service name, with the
//! entry name as the account. Platform errors collapse to `None` / `false`
//! and are logged at `warn`.

use keyring::Entry;
use tracing::warn;

use crate::store::{names, CredentialStore};

/// Default keychain service name.
pub const DEFAULT_SERVICE: &str = "lockwell.core";

pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        match Entry::new(&self.service, key) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "keychain entry unavailable");
                None
            }
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.entry(key)?.get_secret() {
            Ok(bytes) => Some(bytes),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keychain read denied");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        match entry.set_secret(value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "keychain write denied");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => true,
            Err(e) => {
                warn!(key, error = %e, "keychain delete denied");
                false
            }
        }
    }

    /// The keychain cannot be enumerated, so this removes every name the
    /// crate is known to write.
    fn clear_all(&self) -> bool {
        names::ALL
            .iter()
            .fold(true, |ok, name| self.delete(name) && ok)
    }
}
