//! Key derivation and ownership.
//!
//! This module owns three responsibilities:
//! 1. Holding master and derived key material in types that are opaque,
//!    non-cloneable, and zeroised on drop.
//! 2. Deriving the per-call encryption key from the master key using
//!    HKDF-SHA256.
//! 3. The master key lifecycle: lazy creation, rotation, and wipe, persisted
//!    through the credential store.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`).
//!
//! ## Derivation structure
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = master_key,
//!     salt = master_salt,
//!     info = "lockwell:record:v1"
//! )
//! ```
//!
//! ## Locking
//!
//! A readers-writer lock guards the stored material. Encrypt and decrypt hold
//! a read guard for the whole call; rotation and wipe take the write guard,
//! so material never changes underneath an in-flight operation.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ring::{digest, hkdf};
use tracing::{debug, error, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::audit::{AuditEvent, AuditTrail};
use crate::crypto::{self, KEY_LEN};
use crate::error::{Error, Result};
use crate::store::{names, CredentialStore};

/// HKDF info string binding derived keys to record encryption.
const RECORD_INFO: &[u8] = b"lockwell:record:v1";

/// Bytes of SHA-256(key || salt) kept as the pair fingerprint.
const FINGERPRINT_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Master key material
// ---------------------------------------------------------------------------

/// The device's master key and its salt. Always read, written, and replaced
/// as a pair.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Raw bytes never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKeyMaterial {
    key: [u8; KEY_LEN],
    salt: [u8; KEY_LEN],
}

impl MasterKeyMaterial {
    fn generate() -> Result<Self> {
        Ok(Self {
            key: crypto::generate_random_key()?,
            salt: crypto::generate_random_key()?,
        })
    }

    /// Build from stored entries. Anything but two 32-byte buffers is
    /// treated as absent.
    fn from_stored(key: &[u8], salt: &[u8]) -> Option<Self> {
        Some(Self {
            key: key.try_into().ok()?,
            salt: salt.try_into().ok()?,
        })
    }

    pub(crate) fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub(crate) fn salt(&self) -> &[u8; KEY_LEN] {
        &self.salt
    }

    /// First bytes of SHA-256(key || salt). Stored beside the pair so a key
    /// and salt from different generations cannot pass as valid material.
    fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(&self.key);
        ctx.update(&self.salt);
        let digest = ctx.finish();

        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest.as_ref()[..FINGERPRINT_LEN]);
        out
    }

    /// Short public identifier: the fingerprint, hex encoded. Safe to log
    /// and audit.
    pub fn key_id(&self) -> String {
        self.fingerprint().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Stored value for one of the three material entries.
    fn entry(&self, name: &str) -> Option<Vec<u8>> {
        match name {
            names::MASTER_KEY => Some(self.key.to_vec()),
            names::MASTER_SALT => Some(self.salt.to_vec()),
            names::MASTER_CHECK => Some(self.fingerprint().to_vec()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for MasterKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyMaterial")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A key derived for a single encrypt or decrypt call. Never persisted.
///
/// - Not `Clone`.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Derive the record-encryption key from master material and a salt.
///
/// Deterministic: the same key and salt always yield the same output, which
/// is what lets decryption re-derive the key used at encryption time.
pub(crate) fn derive_key(material: &MasterKeyMaterial, salt: &[u8; KEY_LEN]) -> Result<DerivedKey> {
    // Extract: PRK = HMAC-SHA256(salt, master_key).
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(material.key());

    // Expand: bind the output to its purpose.
    let info = [RECORD_INFO];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| Error::KeyDerivation)?;

    let mut bytes = [0u8; KEY_LEN];
    okm.fill(&mut bytes).map_err(|_| Error::KeyDerivation)?;
    Ok(DerivedKey { bytes })
}

// ---------------------------------------------------------------------------
// Key manager
// ---------------------------------------------------------------------------

/// Sole owner of the master key material.
pub struct KeyManager {
    store: Arc<dyn CredentialStore>,
    audit: AuditTrail,
    lock: RwLock<()>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn CredentialStore>, audit: AuditTrail) -> Self {
        Self {
            store,
            audit,
            lock: RwLock::new(()),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the stored pair. A missing or malformed half, or a pair that
    /// does not match its fingerprint, means "absent".
    fn load(&self) -> Option<MasterKeyMaterial> {
        let key = zeroize::Zeroizing::new(self.store.get(names::MASTER_KEY)?);
        let salt = zeroize::Zeroizing::new(self.store.get(names::MASTER_SALT)?);
        let Some(material) = MasterKeyMaterial::from_stored(&key, &salt) else {
            warn!("stored master key material is malformed; treating as absent");
            return None;
        };
        let check = self.store.get(names::MASTER_CHECK);
        if check.as_deref() != Some(&material.fingerprint()[..]) {
            warn!("stored master key does not match its salt; treating as absent");
            return None;
        }
        Some(material)
    }

    /// Write key, salt, then fingerprint. If any write is refused the
    /// entries already written are restored from `previous` (or deleted when
    /// there was none). A rollback the store also refuses is reported as
    /// [`Error::InconsistentKeyMaterial`]; the fingerprint then no longer
    /// matches, so the mixed pair reads as absent rather than as valid.
    fn persist(&self, material: &MasterKeyMaterial, previous: Option<&MasterKeyMaterial>) -> Result<()> {
        const ORDER: [&str; 3] = [names::MASTER_KEY, names::MASTER_SALT, names::MASTER_CHECK];

        for (i, name) in ORDER.iter().enumerate() {
            let value = zeroize::Zeroizing::new(material.entry(name).unwrap_or_default());
            if self.store.set(name, &value) {
                continue;
            }
            if !self.roll_back(&ORDER[..i], previous) {
                error!(entry = *name, "key write refused and rollback refused");
                return Err(Error::InconsistentKeyMaterial);
            }
            warn!(entry = *name, "key write refused; rolled back");
            return Err(Error::CredentialStore(name.to_string()));
        }
        Ok(())
    }

    /// Undo `written`. Attempts every entry even after a refusal.
    fn roll_back(&self, written: &[&str], previous: Option<&MasterKeyMaterial>) -> bool {
        written.iter().fold(true, |ok, name| {
            let restored = match previous.and_then(|prev| prev.entry(name)) {
                Some(value) => self.store.set(name, &zeroize::Zeroizing::new(value)),
                None => self.store.delete(name),
            };
            restored && ok
        })
    }

    /// Caller must hold the write guard.
    fn create_locked(&self) -> Result<MasterKeyMaterial> {
        let material = MasterKeyMaterial::generate()?;
        self.persist(&material, None)?;
        let key_id = material.key_id();
        info!(%key_id, "created master key material");
        self.audit.record(AuditEvent::KeyCreated { key_id });
        Ok(material)
    }

    /// Return the stored material, creating and persisting it on first use.
    ///
    /// Idempotent: without an intervening [`rotate`](Self::rotate) or
    /// [`wipe`](Self::wipe), repeated calls return the same key and salt.
    pub fn get_or_create_master_key(&self) -> Result<MasterKeyMaterial> {
        {
            let _read = self.read_guard();
            if let Some(material) = self.load() {
                debug!("loaded master key material");
                return Ok(material);
            }
        }

        let _write = self.write_guard();
        // Another caller may have created it while we waited.
        match self.load() {
            Some(material) => Ok(material),
            None => self.create_locked(),
        }
    }

    /// True when well-formed material is stored. Never creates any.
    pub fn has_master_key(&self) -> bool {
        let _read = self.read_guard();
        self.load().is_some()
    }

    /// Run `f` with the derived record key while holding the read guard, so
    /// rotation and wipe cannot interleave. Creates material on first use.
    pub(crate) fn with_derived_key<T>(&self, f: impl FnOnce(&DerivedKey) -> Result<T>) -> Result<T> {
        {
            let _read = self.read_guard();
            if let Some(material) = self.load() {
                let derived = derive_key(&material, material.salt())?;
                return f(&derived);
            }
        }

        let _write = self.write_guard();
        let material = match self.load() {
            Some(material) => material,
            None => self.create_locked()?,
        };
        let derived = derive_key(&material, material.salt())?;
        f(&derived)
    }

    /// Replace the material with a fresh key and salt.
    ///
    /// **Destructive**: existing ciphertexts are not re-encrypted and become
    /// permanently undecryptable. Use
    /// [`EncryptionEngine::rotate_reencrypting`](crate::engine::EncryptionEngine::rotate_reencrypting)
    /// to carry known ciphertexts across.
    pub fn rotate(&self) -> Result<()> {
        self.rotate_with(|_, _| Ok(()), |_| 0)
    }

    /// Rotation core. Under the write guard: derive the old key (if any) and
    /// the new key, run `f`, and persist the new material only if `f`
    /// succeeded. On any error the stored material is unchanged.
    pub(crate) fn rotate_with<T>(
        &self,
        f: impl FnOnce(Option<&DerivedKey>, &DerivedKey) -> Result<T>,
        count: impl FnOnce(&T) -> usize,
    ) -> Result<T> {
        let _write = self.write_guard();

        let old = self.load();
        let old_derived = match &old {
            Some(material) => Some(derive_key(material, material.salt())?),
            None => None,
        };

        let fresh = MasterKeyMaterial::generate()?;
        let fresh_derived = derive_key(&fresh, fresh.salt())?;

        let out = f(old_derived.as_ref(), &fresh_derived)?;
        self.persist(&fresh, old.as_ref())?;

        let key_id = fresh.key_id();
        let reencrypted = count(&out);
        info!(%key_id, reencrypted, "rotated master key material");
        self.audit.record(AuditEvent::KeyRotated { key_id, reencrypted });
        Ok(out)
    }

    /// Delete the key and salt. The next use generates new material, silently
    /// orphaning every existing ciphertext.
    pub fn wipe(&self) -> Result<()> {
        let _write = self.write_guard();
        // Fingerprint first: a partial wipe then reads as absent.
        let check_ok = self.store.delete(names::MASTER_CHECK);
        let key_ok = self.store.delete(names::MASTER_KEY);
        let salt_ok = self.store.delete(names::MASTER_SALT);
        if !(check_ok && key_ok && salt_ok) {
            warn!("credential store refused to delete master key material");
            return Err(Error::CredentialStore("wipe".to_string()));
        }
        info!("wiped master key material");
        self.audit.record(AuditEvent::KeyWiped);
        Ok(())
    }
}
