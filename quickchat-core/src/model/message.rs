//! Point-to-point chat messages

use super::types::Timestamp;
use serde::{Deserialize, Serialize};

/// One chat message, immutable once written
///
/// Stored identically under both participants' conversation subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "senderPhoneNumber", default)]
    pub sender_phone_number: String,
    #[serde(rename = "message", default)]
    pub text: String,
    #[serde(rename = "timeStamp", default)]
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(sender_phone_number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_phone_number: sender_phone_number.into(),
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// A message together with the id assigned when it was appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub message: Message,
}

/// The two stored copies of a dual-written message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCopy {
    /// `messages/{sender}/{receiver}/{id}`
    SenderView,
    /// `messages/{receiver}/{sender}/{id}`
    ReceiverView,
}
