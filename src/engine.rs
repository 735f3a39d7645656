//! Encryption engine.
//!
//! Encrypts and decrypts serialized records with a key derived fresh for each
//! call. Calls are independent and may run concurrently; each one holds the
//! key manager's read guard, so rotation and wipe wait for them to finish.

use std::sync::Arc;

use tracing::warn;

use crate::audit::{AuditEvent, AuditTrail};
use crate::crypto;
use crate::error::{Error, Result};
use crate::keys::KeyManager;

pub struct EncryptionEngine {
    keys: Arc<KeyManager>,
    audit: AuditTrail,
}

impl EncryptionEngine {
    pub fn new(keys: Arc<KeyManager>, audit: AuditTrail) -> Self {
        Self { keys, audit }
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Seal `plaintext` under a fresh random nonce.
    ///
    /// Output is `nonce(12) || ciphertext || tag(16)`. Two calls on the same
    /// plaintext never produce the same bytes.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.keys
            .with_derived_key(|key| crypto::seal(key.as_bytes(), plaintext))
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`Error::InvalidFormat`] for buffers under 28 bytes and
    /// [`Error::AuthenticationFailed`] when the tag does not verify.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .keys
            .with_derived_key(|key| crypto::open(key.as_bytes(), envelope));
        if let Err(Error::AuthenticationFailed) = result {
            warn!(len = envelope.len(), "ciphertext failed authentication");
            self.audit.record(AuditEvent::TamperDetected);
        }
        result
    }

    /// UTF-8 convenience over [`encrypt`](Self::encrypt).
    pub fn encrypt_string(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.encrypt(plaintext.as_bytes())
    }

    /// UTF-8 convenience over [`decrypt`](Self::decrypt). A payload that
    /// decrypts but is not UTF-8 fails with [`Error::Encoding`].
    pub fn decrypt_string(&self, envelope: &[u8]) -> Result<String> {
        let bytes = self.decrypt(envelope)?;
        String::from_utf8(bytes).map_err(|_| Error::Encoding)
    }

    /// Rotate the master key and carry `envelopes` across to it.
    ///
    /// Every envelope is opened under the current key and resealed under
    /// fresh material while the write guard is held. Nothing is persisted
    /// unless every envelope opened; on error the old key and the input
    /// envelopes remain valid. Returns the resealed envelopes in input order.
    ///
    /// Ciphertexts not passed in here are orphaned, exactly as with
    /// [`KeyManager::rotate`].
    pub fn rotate_reencrypting(&self, envelopes: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.keys.rotate_with(
            |old, fresh| {
                if envelopes.is_empty() {
                    return Ok(Vec::new());
                }
                let old = old.ok_or(Error::AuthenticationFailed)?;
                envelopes
                    .iter()
                    .map(|envelope| {
                        let plaintext = zeroize::Zeroizing::new(crypto::open(old.as_bytes(), envelope)?);
                        crypto::seal(fresh.as_bytes(), &plaintext)
                    })
                    .collect()
            },
            |resealed: &Vec<Vec<u8>>| resealed.len(),
        )
    }
}
