use std::sync::Arc;

use chrono::Duration;
use lockwell::clock::ManualClock;
use lockwell::config::SecurityConfig;
use lockwell::gate::testing::{AlwaysDeny, AlwaysGrant};
use lockwell::store::MemoryCredentialStore;
use lockwell::{AuthState, DataGuard, Error};

fn guard_with(timeout_secs: u64) -> (Arc<ManualClock>, DataGuard) {
    let clock = Arc::new(ManualClock::starting_now());
    let guard = DataGuard::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(AlwaysGrant::default()),
        clock.clone(),
        SecurityConfig::default().with_auto_lock_timeout(timeout_secs),
    )
    .unwrap();
    (clock, guard)
}

#[test]
fn test_successful_then_expired_session() {
    let (clock, guard) = guard_with(300);

    assert!(guard.authenticate("unlock").is_success());
    assert!(guard.is_session_valid());

    clock.advance(Duration::seconds(301));
    assert!(!guard.is_session_valid());
    assert_eq!(guard.machine().state(), AuthState::Expired);
}

#[test]
fn test_expiry_boundary_is_exclusive() {
    let (clock, guard) = guard_with(60);
    guard.authenticate("unlock");

    clock.advance(Duration::milliseconds(59_999));
    assert!(guard.is_session_valid());
    clock.advance(Duration::milliseconds(1));
    assert!(!guard.is_session_valid());
}

#[test]
fn test_expired_session_blocks_data_access() {
    // Threat: device left unattended after unlock.
    let (clock, guard) = guard_with(300);
    guard.authenticate("unlock");
    let envelope = guard.encrypt_string("card ending 4242").unwrap();

    clock.advance(Duration::minutes(10));
    assert!(matches!(guard.decrypt_string(&envelope), Err(Error::Locked)));

    // Re-authenticating restores access to the same data.
    assert!(guard.authenticate("unlock").is_success());
    assert_eq!(guard.decrypt_string(&envelope).unwrap(), "card ending 4242");
}

#[test]
fn test_logout_blocks_data_access() {
    let (_, guard) = guard_with(300);
    guard.authenticate("unlock");
    guard.logout();
    assert!(matches!(guard.encrypt(b"x"), Err(Error::Locked)));
    assert_eq!(guard.machine().state(), AuthState::NotAuthenticated);
}

#[test]
fn test_explicit_refresh() {
    let (clock, guard) = guard_with(300);
    assert!(!guard.refresh());

    guard.authenticate("unlock");
    clock.advance(Duration::seconds(250));
    assert!(guard.refresh());
    clock.advance(Duration::seconds(250));
    assert!(guard.is_session_valid());
}

#[test]
fn test_denied_prompt_opens_no_session() {
    let clock = Arc::new(ManualClock::starting_now());
    let guard = DataGuard::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(AlwaysDeny::new()),
        clock,
        SecurityConfig::default(),
    )
    .unwrap();

    assert!(!guard.authenticate("unlock").is_success());
    assert!(!guard.is_session_valid());
    assert!(matches!(guard.encrypt(b"x"), Err(Error::Locked)));
}
