//! Backend contract
//!
//! The hosted phone-auth provider and realtime database are external
//! services. The core only talks to them through the traits in this module,
//! which are injected into each component at construction time. The
//! [`memory`] submodule provides an in-process implementation used by tests
//! and the CLI demo.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  ┌────────────────┐  ┌────────────────┐
//! │ AuthSession │  │ ChatAggregator │  │ MessageChannel │
//! └──┬───┬───┬──┘  └───────┬────────┘  └───────┬────────┘
//!    │   │   │             │                   │
//!    ▼   │   ▼             ▼                   ▼
//!  Flags │ PhoneAuth   RealtimeDatabase ◄──────┘
//!        └──────────────────►
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub mod error;
pub mod flags;
pub mod memory;
pub mod path;
pub mod query;
pub mod snapshot;
pub mod subscription;

pub use error::{BackendError, BackendResult};
pub use flags::{FileFlagStore, FlagStore, MemoryFlagStore};
pub use path::DbPath;
pub use query::{OrderBy, Query};
pub use snapshot::DataSnapshot;
pub use subscription::{ChildEvent, Subscription, ValueEvent};

/// How the provider should deliver the one-time code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryChannel {
    #[default]
    Sms,
    Voice,
}

/// Caller-side context needed by the provider to run the challenge
/// (delivery channel, locale for the SMS template, app surface hint)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryContext {
    pub channel: DeliveryChannel,
    pub locale: Option<String>,
    pub surface: Option<String>,
}

impl DeliveryContext {
    pub fn sms() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surface = Some(surface.into());
        self
    }
}

/// Proof of phone ownership handed to [`PhoneAuthProvider::sign_in`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneCredential {
    /// Verification id paired with the code the user typed
    Code {
        verification_id: String,
        code: String,
    },
    /// Credential produced by the provider without user input
    /// (trusted device / auto-retrieved SMS)
    Instant {
        phone_number: String,
        token: String,
    },
}

/// Result of starting a phone verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Code sent out of band; pair the id with the code later
    CodeSent { verification_id: String },
    /// Verification already complete
    Instant(PhoneCredential),
}

/// Account returned by a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub phone_number: String,
}

/// Phone-number authentication provider
#[async_trait]
pub trait PhoneAuthProvider: Send + Sync {
    /// Ask the provider to verify `phone_number`
    ///
    /// The provider itself fails the request once `timeout` elapses.
    async fn begin_phone_verification(
        &self,
        phone_number: &str,
        context: &DeliveryContext,
        timeout: Duration,
    ) -> BackendResult<VerificationOutcome>;

    /// Build a credential from a verification id and code. Local, no network.
    fn credential_from_verification(&self, verification_id: &str, code: &str) -> PhoneCredential {
        PhoneCredential::Code {
            verification_id: verification_id.to_string(),
            code: code.to_string(),
        }
    }

    async fn sign_in(&self, credential: PhoneCredential) -> BackendResult<AuthenticatedUser>;

    /// Drop the provider-side session
    async fn sign_out(&self) -> BackendResult<()>;

    /// Account of the current provider session, if any
    fn current_user(&self) -> Option<AuthenticatedUser>;
}

/// Hosted tree-structured realtime database
#[async_trait]
pub trait RealtimeDatabase: Send + Sync {
    /// Read the full value at `path`
    async fn read(&self, path: &DbPath) -> BackendResult<DataSnapshot>;

    /// Single-shot query over the children of `path`
    async fn read_once(&self, path: &DbPath, query: &Query) -> BackendResult<DataSnapshot>;

    /// Per-child listener; existing children are delivered as `Added` first
    async fn subscribe(
        &self,
        path: &DbPath,
        query: &Query,
    ) -> BackendResult<Subscription<ChildEvent>>;

    /// Whole-value listener; the current value is delivered first
    async fn watch(&self, path: &DbPath, query: &Query) -> BackendResult<Subscription<ValueEvent>>;

    /// Replace the value at `path` (`Value::Null` deletes)
    async fn write(&self, path: &DbPath, value: Value) -> BackendResult<()>;

    /// Generate a new child key under `path`; keys sort in generation order
    fn push_id(&self, path: &DbPath) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAuth;

    #[async_trait]
    impl PhoneAuthProvider for NoopAuth {
        async fn begin_phone_verification(
            &self,
            _phone_number: &str,
            _context: &DeliveryContext,
            timeout: Duration,
        ) -> BackendResult<VerificationOutcome> {
            Err(BackendError::Timeout(timeout))
        }

        async fn sign_in(&self, _credential: PhoneCredential) -> BackendResult<AuthenticatedUser> {
            Err(BackendError::InvalidCode)
        }

        async fn sign_out(&self) -> BackendResult<()> {
            Ok(())
        }

        fn current_user(&self) -> Option<AuthenticatedUser> {
            None
        }
    }

    #[test]
    fn test_default_credential_construction() {
        let credential = NoopAuth.credential_from_verification("abc", "123456");
        assert_eq!(
            credential,
            PhoneCredential::Code {
                verification_id: "abc".to_string(),
                code: "123456".to_string(),
            }
        );
    }

    #[test]
    fn test_delivery_context_builder() {
        let ctx = DeliveryContext::sms().with_locale("en-US").with_surface("registration");
        assert_eq!(ctx.channel, DeliveryChannel::Sms);
        assert_eq!(ctx.locale.as_deref(), Some("en-US"));
        assert_eq!(ctx.surface.as_deref(), Some("registration"));
    }
}
