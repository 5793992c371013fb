//! In-process backend
//!
//! Substitutes for the hosted services in tests and in the CLI demo.

mod auth;
mod database;

pub use auth::MemoryPhoneAuth;
pub use database::MemoryDatabase;
