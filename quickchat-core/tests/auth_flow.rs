//! Phone sign-in through the public API, with a file-backed flag store

use quickchat_core::backend::memory::{MemoryDatabase, MemoryPhoneAuth};
use quickchat_core::backend::{BackendError, DeliveryContext, FileFlagStore};
use quickchat_core::{AuthSession, AuthState, ClientConfig, CoreError};
use std::sync::Arc;
use tempfile::TempDir;

const PHONE: &str = "+15551234567";

fn session(auth: MemoryPhoneAuth, flags_dir: &TempDir) -> AuthSession {
    let mut config = ClientConfig::default();
    config.storage.data_dir = flags_dir.path().to_path_buf();
    let flags = FileFlagStore::open(config.storage.flags_path()).unwrap();

    AuthSession::new(
        Arc::new(auth),
        Arc::new(MemoryDatabase::new()),
        Arc::new(flags),
    )
    .with_config(&config)
}

#[tokio::test]
async fn test_wrong_code_then_right_code() {
    let dir = TempDir::new().unwrap();
    let session = session(
        MemoryPhoneAuth::new()
            .with_code(PHONE, "123456")
            .with_next_verification_id("abc"),
        &dir,
    );

    let state = session
        .submit_phone_number(PHONE, &DeliveryContext::sms().with_locale("en-US"))
        .await
        .unwrap();
    assert_eq!(state.verification_id(), Some("abc"));

    let state = session.submit_code("000000").await.unwrap();
    assert_eq!(state.failure_message(), Some("Sign-in failed"));

    let state = session.submit_code("123456").await.unwrap();
    match state {
        AuthState::Authenticated(identity) => assert_eq!(identity.phone_number, PHONE),
        other => panic!("expected authenticated, got {:?}", other),
    }

    // The marker survives a restart
    let reopened = self::session(MemoryPhoneAuth::new(), &dir);
    assert!(reopened.is_signed_in());
}

#[tokio::test]
async fn test_every_submission_settles() {
    let dir = TempDir::new().unwrap();
    let numbers = ["+15551234567", "+15550000002", "5551234", "+1555000000x"];
    let auth = MemoryPhoneAuth::new()
        .with_instant_verification("+15550000002")
        .with_rejection("+15551234567", BackendError::QuotaExceeded);
    let session = session(auth, &dir);

    for number in numbers {
        let _ = session.reset();
        let state = session
            .submit_phone_number(number, &DeliveryContext::sms())
            .await
            .unwrap();
        assert!(
            matches!(
                state,
                AuthState::ChallengeIssued(_) | AuthState::Authenticated(_) | AuthState::Failed(_)
            ),
            "{} left the session in {:?}",
            number,
            state
        );
        assert!(!session.state().is_busy());
    }
}

#[tokio::test]
async fn test_code_before_number_is_rejected_locally() {
    let dir = TempDir::new().unwrap();
    let session = session(MemoryPhoneAuth::new(), &dir);

    let state = session.submit_code("123456").await.unwrap();
    let AuthState::Failed(failure) = state else {
        panic!("expected failure");
    };
    assert_eq!(failure.message, "verification not started");
    assert!(matches!(failure.error, CoreError::PreconditionFailed(_)));
    assert!(!session.is_signed_in());
}
