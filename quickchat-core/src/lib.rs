//! QuickChat client synchronization core
//!
//! Three components sit between a mobile chat UI and a hosted realtime
//! backend:
//!
//! - [`AuthSession`]: phone-number sign-in state machine
//! - [`ChatAggregator`]: live chat list joining conversation metadata with
//!   each conversation's last message
//! - [`MessageChannel`]: dual-write send and tail-subscription receive
//!
//! The backend is reached only through the traits in [`backend`]; the
//! [`backend::memory`] implementations run everything in-process.

pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod errors;
pub mod image_codec;
pub mod listener;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod model;
pub mod schema;

#[cfg(test)]
pub mod test_utils;

pub use auth::{AuthFailure, AuthSession, AuthState, IdentityHandle};
pub use chat::{ChatAggregator, ChatDirectory};
pub use config::{ClientConfig, ConfigError};
pub use errors::{CoreError, CoreResult};
pub use listener::ListenerHandle;
pub use logging::{init_logging, LogLevel};
pub use messaging::MessageChannel;
