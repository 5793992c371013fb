//! Client metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op. Embedders wire their own exporter.

use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use std::time::Instant;

pub const AUTH_VERIFICATIONS_REQUESTED: &str = "auth.verification.requested";
pub const AUTH_SIGN_IN_SUCCESS: &str = "auth.sign_in.success";
pub const AUTH_SIGN_IN_FAILED: &str = "auth.sign_in.failed";
pub const AUTH_SIGN_OUT: &str = "auth.sign_out";

pub const CHAT_LIST_PUBLISHED: &str = "chat.list.published";
pub const CHAT_LIST_SIZE: &str = "chat.list.size";
pub const CHAT_LIST_LOAD_DURATION_MS: &str = "chat.list.load.duration_ms";

pub const MESSAGES_SENT: &str = "messaging.messages.sent";
pub const MESSAGES_PARTIAL: &str = "messaging.messages.partial";
pub const MESSAGES_RECEIVED: &str = "messaging.messages.received";

/// Register descriptions for every client metric
pub fn init_metrics() {
    // Auth metrics
    describe_counter!(
        AUTH_VERIFICATIONS_REQUESTED,
        "Phone verifications requested from the provider"
    );
    describe_counter!(AUTH_SIGN_IN_SUCCESS, "Successful sign-ins");
    describe_counter!(AUTH_SIGN_IN_FAILED, "Failed sign-ins");
    describe_counter!(AUTH_SIGN_OUT, "Sign-outs");

    // Chat list metrics
    describe_counter!(CHAT_LIST_PUBLISHED, "Chat lists published to observers");
    describe_gauge!(CHAT_LIST_SIZE, "Entries in the last published chat list");
    describe_histogram!(
        CHAT_LIST_LOAD_DURATION_MS,
        "Time to join conversations with their last messages in milliseconds"
    );

    // Messaging metrics
    describe_counter!(MESSAGES_SENT, "Messages written to both copies");
    describe_counter!(MESSAGES_PARTIAL, "Sends where one copy failed");
    describe_counter!(MESSAGES_RECEIVED, "Incoming messages delivered to handlers");
}

/// Measures an operation and records it as a histogram in milliseconds
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Record the elapsed time
    pub fn stop(self) {
        let elapsed = self.start.elapsed();
        histogram!(self.name).record(elapsed.as_secs_f64() * 1000.0);
    }
}
