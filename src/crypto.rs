//! Low-level cryptographic operations.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `keys`). All other modules encrypt and decrypt
//! exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//!
//! # Envelope layout
//! ```text
//! [ nonce (12 bytes) ][ ciphertext (N bytes) ][ GCM tag (16 bytes) ]
//! ```
//! There is no version byte. A format change needs an out-of-band migration.

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{self, SystemRandom};

use crate::error::{Error, Result};

/// The AEAD algorithm used throughout lockwell.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a master, salt, or derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Shortest buffer that can be a valid envelope (empty plaintext).
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN;

/// A nonce generated for a single encryption operation.
///
/// Only `generate_nonce` constructs one and `seal` consumes it by value, so a
/// nonce can never be handed to the cipher twice.
struct OwnedNonce([u8; NONCE_LEN]);

impl OwnedNonce {
    fn into_ring(self) -> (Nonce, [u8; NONCE_LEN]) {
        (Nonce::assume_unique_for_key(self.0), self.0)
    }
}

/// Generate a cryptographically secure random nonce.
///
/// There is no nonce caching or counter-based generation: every call draws
/// 96 fresh bits from the system RNG.
fn generate_nonce() -> Result<OwnedNonce> {
    let mut buf = [0u8; NONCE_LEN];
    fill_random(&mut buf)?;
    Ok(OwnedNonce(buf))
}

/// Fill `buf` from `ring::rand::SystemRandom`, the only randomness source in
/// the crate.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    let rng = SystemRandom::new();
    rand::SecureRandom::fill(&rng, buf).map_err(|_| Error::Randomness)
}

/// Generate a cryptographically secure random 256-bit value.
pub(crate) fn generate_random_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

fn bind_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| Error::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A parsed ciphertext envelope: `nonce || ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextEnvelope {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl CiphertextEnvelope {
    /// Split a flat buffer into its parts.
    ///
    /// Buffers shorter than [`MIN_ENVELOPE_LEN`] are rejected with
    /// [`Error::InvalidFormat`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(Error::InvalidFormat);
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        Ok(Self {
            nonce: nonce.try_into().map_err(|_| Error::InvalidFormat)?,
            ciphertext: ciphertext.to_vec(),
            tag: tag.try_into().map_err(|_| Error::InvalidFormat)?,
        })
    }

    /// The nonce used to seal this envelope.
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// The encrypted payload, without nonce or tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The GCM authentication tag.
    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Serialize back to the flat wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypt a plaintext payload using AES-256-GCM under a fresh nonce.
///
/// Returns the flat envelope bytes. The caller does not manage the nonce; it
/// travels with the output and is extracted automatically by [`open`].
pub fn seal(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = bind_key(key_bytes)?;
    let (nonce, nonce_bytes) = generate_nonce()?.into_ring();

    let mut output = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(plaintext);

    // Encrypts `output[NONCE_LEN..]` in place and appends the tag.
    let mut body = output.split_off(NONCE_LEN);
    key.seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut body)
        .map_err(|_| Error::EncryptionFailure)?;
    output.append(&mut body);

    Ok(output)
}

/// Decrypt an envelope produced by [`seal`].
///
/// If the key is wrong or the envelope has been tampered with, the GCM check
/// fails with [`Error::AuthenticationFailed`] and no partial plaintext is
/// returned.
///
/// A short buffer is reported as [`Error::InvalidFormat`], but only after a
/// decoy open of the same cost as verifying a minimum-size envelope. Timing
/// therefore does not separate a short buffer from a tag failure on an
/// envelope of comparable length. Opening cost grows with envelope length,
/// so a long envelope takes longer either way; that reveals only the length
/// the caller already supplied.
pub fn open(key_bytes: &[u8; KEY_LEN], envelope: &[u8]) -> Result<Vec<u8>> {
    let key = bind_key(key_bytes)?;

    if envelope.len() < MIN_ENVELOPE_LEN {
        let mut decoy = [0u8; TAG_LEN];
        let _ = key.open_in_place(
            Nonce::assume_unique_for_key([0u8; NONCE_LEN]),
            aead::Aad::empty(),
            &mut decoy,
        );
        return Err(Error::InvalidFormat);
    }

    let nonce_bytes: [u8; NONCE_LEN] = envelope[..NONCE_LEN]
        .try_into()
        .map_err(|_| Error::InvalidFormat)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut payload = envelope[NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(nonce, aead::Aad::empty(), &mut payload)
        .map_err(|_| Error::AuthenticationFailed)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = seal(&KEY, b"receipt #1042").unwrap();
        assert_eq!(sealed.len(), MIN_ENVELOPE_LEN + 13);
        assert_eq!(open(&KEY, &sealed).unwrap(), b"receipt #1042");
    }

    #[test]
    fn test_empty_plaintext_is_minimum_envelope() {
        let sealed = seal(&KEY, b"").unwrap();
        assert_eq!(sealed.len(), MIN_ENVELOPE_LEN);
        assert!(open(&KEY, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_short_buffer_is_invalid_format() {
        for len in 0..MIN_ENVELOPE_LEN {
            let buf = vec![0u8; len];
            assert!(matches!(open(&KEY, &buf), Err(Error::InvalidFormat)));
        }
    }

    #[test]
    fn test_short_and_minimum_envelopes_fail_alike() {
        // Both sides of the format boundary reach the cipher and fail
        // without yielding plaintext.
        let short = [0u8; MIN_ENVELOPE_LEN - 1];
        let minimum = [0u8; MIN_ENVELOPE_LEN];
        assert!(open(&KEY, &short).unwrap_err().is_data_unreadable());
        assert!(open(&KEY, &minimum).unwrap_err().is_data_unreadable());
        assert!(matches!(open(&KEY, &minimum), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = seal(&KEY, b"warranty").unwrap();
        let other = [8u8; KEY_LEN];
        assert!(matches!(open(&other, &sealed), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_envelope_parse_splits_parts() {
        let sealed = seal(&KEY, b"abc").unwrap();
        let env = CiphertextEnvelope::parse(&sealed).unwrap();
        assert_eq!(env.nonce(), &sealed[..NONCE_LEN]);
        assert_eq!(env.ciphertext().len(), 3);
        assert_eq!(env.tag(), &sealed[sealed.len() - TAG_LEN..]);
        assert_eq!(env.to_bytes(), sealed);
    }

    #[test]
    fn test_envelope_parse_rejects_short() {
        assert!(matches!(
            CiphertextEnvelope::parse(&[0u8; MIN_ENVELOPE_LEN - 1]),
            Err(Error::InvalidFormat)
        ));
    }
}
