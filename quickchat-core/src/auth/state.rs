//! Phone authentication states

use crate::errors::CoreError;
use crate::model::{Identity, VerificationChallenge};

/// User-visible message for any failed sign-in
pub const SIGN_IN_FAILED: &str = "Sign-in failed";
/// User-visible message when the provider refuses to start verification
pub const VERIFICATION_FAILED: &str = "Verification failed";
/// User-visible message when a code is submitted without a live challenge
pub const VERIFICATION_NOT_STARTED: &str = "verification not started";

/// Why the session ended up in [`AuthState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Short message suitable for a notification
    pub message: String,
    /// Classified cause, with the provider detail
    pub error: CoreError,
}

impl AuthFailure {
    pub fn new(message: impl Into<String>, error: CoreError) -> Self {
        Self {
            message: message.into(),
            error,
        }
    }

    pub(crate) fn not_started() -> Self {
        Self::new(
            VERIFICATION_NOT_STARTED,
            CoreError::PreconditionFailed(VERIFICATION_NOT_STARTED.to_string()),
        )
    }
}

/// State of an [`AuthSession`](super::AuthSession)
///
/// ```text
/// Idle ─► Submitting ─► ChallengeIssued ─► Verifying ─► Authenticated
///              │               │               │
///              └───────────────┴───────────────┴──────► Failed
/// ```
///
/// `Submitting` may also go straight to `Verifying` when the provider
/// verifies the number instantly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Idle,
    Submitting,
    ChallengeIssued(VerificationChallenge),
    Verifying,
    Authenticated(Identity),
    Failed(AuthFailure),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Idle => "idle",
            AuthState::Submitting => "submitting",
            AuthState::ChallengeIssued(_) => "challenge issued",
            AuthState::Verifying => "verifying",
            AuthState::Authenticated(_) => "authenticated",
            AuthState::Failed(_) => "failed",
        }
    }

    /// A backend call is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, AuthState::Submitting | AuthState::Verifying)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn verification_id(&self) -> Option<&str> {
        match self {
            AuthState::ChallengeIssued(challenge) => Some(&challenge.verification_id),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            AuthState::Failed(failure) => Some(&failure.message),
            _ => None,
        }
    }
}
