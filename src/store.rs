//! Secure credential store boundary.
//!
//! The store is an opaque key-value map from short string names to raw byte
//! buffers. It is the single source of truth across process restarts for key
//! material and for the lockout counters.
//!
//! Implementations must restrict access to the unlocked device and this
//! application's sandbox, and each operation must be atomic with respect to a
//! single key. Platform denial (e.g. device locked) surfaces as `None` /
//! `false`, never as an error: callers treat absence as "not yet initialized".

use std::collections::HashMap;
use std::sync::RwLock;

/// Well-known entry names.
pub mod names {
    /// 32-byte master key.
    pub const MASTER_KEY: &str = "master-key";
    /// 32-byte salt paired with the master key.
    pub const MASTER_SALT: &str = "master-salt";
    /// 8-byte SHA-256 fingerprint of the key and salt, written last. A pair
    /// that does not match it is treated as absent.
    pub const MASTER_CHECK: &str = "master-check";
    /// Unix millis of the last successful authentication (i64 BE).
    pub const LAST_AUTH_TIME: &str = "last-auth-time";
    /// Consecutive failed authentication attempts (u32 BE).
    pub const FAILED_ATTEMPTS: &str = "failed-attempts";
    /// Unix millis when the current lockout window ends (i64 BE).
    pub const LOCKOUT_UNTIL: &str = "lockout-until";
    /// Single byte, 1 when the user has granted data-protection consent.
    pub const PRIVACY_CONSENT: &str = "privacy-consent";

    /// Every name this crate writes.
    pub const ALL: &[&str] = &[
        MASTER_KEY,
        MASTER_SALT,
        MASTER_CHECK,
        LAST_AUTH_TIME,
        FAILED_ATTEMPTS,
        LOCKOUT_UNTIL,
        PRIVACY_CONSENT,
    ];
}

/// Opaque secret storage supplied by the host platform.
pub trait CredentialStore: Send + Sync {
    /// Read an entry. `None` when absent or when the platform denies access.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Write an entry, replacing any existing value. `false` on denial.
    fn set(&self, key: &str, value: &[u8]) -> bool;

    /// Remove an entry. Removing an absent entry succeeds.
    fn delete(&self, key: &str) -> bool;

    /// Remove every entry owned by this application.
    fn clear_all(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Helpers for fixed-width integer entries
// ---------------------------------------------------------------------------

pub(crate) fn get_u32(store: &dyn CredentialStore, key: &str) -> Option<u32> {
    let bytes = store.get(key)?;
    Some(u32::from_be_bytes(bytes.as_slice().try_into().ok()?))
}

pub(crate) fn set_u32(store: &dyn CredentialStore, key: &str, value: u32) -> bool {
    store.set(key, &value.to_be_bytes())
}

pub(crate) fn get_i64(store: &dyn CredentialStore, key: &str) -> Option<i64> {
    let bytes = store.get(key)?;
    Some(i64::from_be_bytes(bytes.as_slice().try_into().ok()?))
}

pub(crate) fn set_i64(store: &dyn CredentialStore, key: &str, value: i64) -> bool {
    store.set(key, &value.to_be_bytes())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory store backed by a `HashMap`.
///
/// Not persistent and not protected: intended for tests and for hosts that
/// supply durability elsewhere. `set_denied` simulates a locked device, where
/// every operation fails silently.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    denied: RwLock<bool>,
    deny_keys: RwLock<Vec<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the device locking (`true`) or unlocking (`false`).
    pub fn set_denied(&self, denied: bool) {
        if let Ok(mut guard) = self.denied.write() {
            *guard = denied;
        }
    }

    /// Refuse writes to one specific entry, leaving the rest writable.
    pub fn deny_writes_to(&self, key: &str) {
        if let Ok(mut guard) = self.deny_keys.write() {
            guard.push(key.to_string());
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_denied(&self) -> bool {
        self.denied.read().map(|d| *d).unwrap_or(true)
    }

    fn write_denied(&self, key: &str) -> bool {
        self.is_denied()
            || self
                .deny_keys
                .read()
                .map(|keys| keys.iter().any(|k| k == key))
                .unwrap_or(true)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.is_denied() {
            return None;
        }
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> bool {
        if self.write_denied(key) {
            return false;
        }
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value.to_vec());
                true
            }
            Err(_) => false,
        }
    }

    fn delete(&self, key: &str) -> bool {
        if self.is_denied() {
            return false;
        }
        match self.entries.write() {
            Ok(mut entries) => {
                entries.remove(key);
                true
            }
            Err(_) => false,
        }
    }

    fn clear_all(&self) -> bool {
        if self.is_denied() {
            return false;
        }
        match self.entries.write() {
            Ok(mut entries) => {
                entries.clear();
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryCredentialStore::new();
        assert!(store.get(names::MASTER_KEY).is_none());

        assert!(store.set(names::MASTER_KEY, &[1, 2, 3]));
        assert_eq!(store.get(names::MASTER_KEY).unwrap(), vec![1, 2, 3]);

        assert!(store.delete(names::MASTER_KEY));
        assert!(store.get(names::MASTER_KEY).is_none());

        // Deleting an absent entry still succeeds.
        assert!(store.delete(names::MASTER_KEY));
    }

    #[test]
    fn test_denied_store_fails_silently() {
        let store = MemoryCredentialStore::new();
        store.set(names::MASTER_SALT, &[9; 32]);
        store.set_denied(true);

        assert!(store.get(names::MASTER_SALT).is_none());
        assert!(!store.set(names::MASTER_SALT, &[0; 32]));
        assert!(!store.clear_all());

        store.set_denied(false);
        assert_eq!(store.get(names::MASTER_SALT).unwrap(), vec![9; 32]);
    }

    #[test]
    fn test_integer_entries() {
        let store = MemoryCredentialStore::new();
        assert!(set_u32(&store, names::FAILED_ATTEMPTS, 4));
        assert_eq!(get_u32(&store, names::FAILED_ATTEMPTS), Some(4));

        assert!(set_i64(&store, names::LOCKOUT_UNTIL, -17));
        assert_eq!(get_i64(&store, names::LOCKOUT_UNTIL), Some(-17));

        // Wrong width reads as absent.
        store.set(names::FAILED_ATTEMPTS, &[1, 2]);
        assert_eq!(get_u32(&store, names::FAILED_ATTEMPTS), None);
    }

    #[test]
    fn test_clear_all() {
        let store = MemoryCredentialStore::new();
        for name in names::ALL {
            store.set(name, b"x");
        }
        assert_eq!(store.len(), names::ALL.len());
        assert!(store.clear_all());
        assert!(store.is_empty());
    }
}
