//! Test utilities and helpers for QuickChat
//!
//! Fixtures for seeding the in-memory backend plus timeout helpers for
//! observing asynchronous state.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
