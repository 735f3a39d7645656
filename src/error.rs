//! Error types for lockwell.
//!
//! Every variant is a distinct failure mode of the authentication gate or the
//! data-protection layer. Messages are intentionally minimal: they signal
//! *what* failed without revealing *why* in ways that could leak
//! cryptographic state or device configuration.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The single error type for all lockwell operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The ciphertext envelope is shorter than nonce + tag. Detected before
    /// the payload is handed to the cipher.
    #[error("malformed ciphertext envelope")]
    InvalidFormat,

    /// The AEAD tag did not verify: wrong key, corrupted data, or tampering.
    /// These causes are deliberately indistinguishable.
    #[error("ciphertext failed authentication")]
    AuthenticationFailed,

    /// A string wrapper could not convert between text and bytes.
    #[error("payload is not valid UTF-8")]
    Encoding,

    /// Neither biometrics nor a device passcode are configured. Permanent
    /// until the user changes device settings.
    #[error("no biometric or passcode authentication is configured")]
    GateUnavailable,

    /// Too many failed attempts; the gate was not consulted.
    #[error("locked out, retry in {}s", retry_after.as_secs())]
    LockedOut {
        /// Time left in the lockout window.
        retry_after: Duration,
    },

    /// No valid session: the caller must authenticate first.
    #[error("session is not authenticated")]
    Locked,

    /// Key material has the wrong length or could not be bound to the cipher.
    #[error("invalid key")]
    InvalidKey,

    /// HKDF expansion failed.
    #[error("key derivation failed")]
    KeyDerivation,

    /// Sealing failed inside the cipher.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system random number generator failed to produce bytes.
    #[error("randomness source failed")]
    Randomness,

    /// The credential store refused a write the key lifecycle depends on.
    #[error("credential store rejected write: {0}")]
    CredentialStore(String),

    /// A refused key write could not be undone. The stored pair no longer
    /// matches its fingerprint and reads as absent.
    #[error("key material left inconsistent after a refused write")]
    InconsistentKeyMaterial,

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures a UI should present as "data unreadable" rather
    /// than exposing cryptographic detail.
    pub fn is_data_unreadable(&self) -> bool {
        matches!(self, Self::InvalidFormat | Self::AuthenticationFailed)
    }
}
