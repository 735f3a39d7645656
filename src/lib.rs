//! # lockwell
//!
//! Local authentication gate and at-rest encryption core.
//!
//! Decides whether the user may reach locally stored sensitive records, and
//! protects those records with authenticated encryption under a device master
//! key:
//!
//! - a session gate with passive auto-lock ([`machine`]),
//! - a bounded-retry lockout that survives restarts,
//! - HKDF-SHA256 key derivation and AES-256-GCM envelopes ([`keys`], [`engine`]),
//! - key rotation and wipe that never leave a half-written key pair.
//!
//! The host supplies three things: a [`CredentialStore`](store::CredentialStore),
//! a biometric/passcode [`PlatformPrompt`](gate::PlatformPrompt) (or any
//! [`AuthGate`](gate::AuthGate)), and a [`Clock`](clock::Clock).
//!
//! ## Public API
//!
//! Most callers only need [`DataGuard`], which wires every component by
//! explicit injection. The component types are public for hosts that want to
//! compose them differently.

// Module declarations.
pub mod audit;
pub mod clock;
pub mod config;
pub(crate) mod crypto;
pub mod engine;
pub mod error;
pub mod gate;
pub mod guard;
#[cfg(feature = "os-keyring")]
pub mod keychain;
pub mod keys;
pub mod machine;
pub mod posture;
pub mod session;
pub mod store;

pub use crypto::{CiphertextEnvelope, MIN_ENVELOPE_LEN, NONCE_LEN, TAG_LEN};
pub use error::{Error, Result};
pub use guard::DataGuard;
pub use session::{AuthMethod, AuthResult, AuthState};
