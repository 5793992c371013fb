//! Error taxonomy for the synchronization core

use crate::backend::BackendError;
use crate::model::MessageCopy;
use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by AuthSession, ChatAggregator and MessageChannel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Bad number, quota or other provider refusal
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Wrong or expired one-time code
    #[error("Verification mismatch: {0}")]
    VerificationMismatch(String),

    /// Operation called without what it needs (no live challenge, no identity, empty input)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Network failure, outage or cancelled listener
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Malformed stored data; callers downgrade it to "absent"
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Operation not allowed from the current auth state
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// One or both copies of a dual-written message were not stored
    #[error("Message {message_id} partially delivered, failed copies: {failed:?}")]
    PartialDelivery {
        message_id: String,
        failed: Vec<MessageCopy>,
    },

    /// Value could not be converted to or from its stored JSON form
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Whether a later retry of the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::BackendUnavailable(_) | CoreError::PartialDelivery { .. }
        )
    }
}

impl From<BackendError> for CoreError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::InvalidPhoneNumber(_) | BackendError::QuotaExceeded => {
                CoreError::AuthRejected(e.to_string())
            }
            BackendError::InvalidCode | BackendError::SessionExpired => {
                CoreError::VerificationMismatch(e.to_string())
            }
            BackendError::Unavailable(_)
            | BackendError::Cancelled(_)
            | BackendError::PermissionDenied(_)
            | BackendError::Timeout(_) => CoreError::BackendUnavailable(e.to_string()),
            BackendError::InvalidPath(_) => CoreError::PreconditionFailed(e.to_string()),
            BackendError::Serialization(msg) => CoreError::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
