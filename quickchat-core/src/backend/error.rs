//! Error types reported by backend collaborators

use thiserror::Error;

/// Result type for backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by the hosted auth/database services (or their fakes)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The provider refused the phone number as malformed
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    /// Too many verification requests for this project or device
    #[error("Verification quota exceeded")]
    QuotaExceeded,

    /// The one-time code did not match the verification id
    #[error("Invalid verification code")]
    InvalidCode,

    /// The verification id is no longer accepted by the provider
    #[error("Verification session expired")]
    SessionExpired,

    /// Network failure or service outage
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A listener or request was cancelled by the backend
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Security rules rejected the request
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path contains a forbidden or empty segment
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Stored value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider did not answer within its own deadline
    #[error("Backend timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl BackendError {
    /// Whether this error came from the provider rejecting a credential
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, BackendError::InvalidCode | BackendError::SessionExpired)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = BackendError::InvalidPhoneNumber("12".to_string());
        assert_eq!(err.to_string(), "Invalid phone number: 12");

        let err = BackendError::Timeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn test_credential_rejection() {
        assert!(BackendError::InvalidCode.is_credential_rejection());
        assert!(BackendError::SessionExpired.is_credential_rejection());
        assert!(!BackendError::QuotaExceeded.is_credential_rejection());
        assert!(!BackendError::Unavailable("offline".into()).is_credential_rejection());
    }

    #[test]
    fn test_serde_conversion() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: BackendError = json_err.into();
        assert!(matches!(err, BackendError::Serialization(_)));
    }
}
