//! Conversation entries and derived chat-list rows

use super::types::Timestamp;
use crate::image_codec::ProfileImage;
use serde::{Deserialize, Serialize};

/// Cached peer metadata stored under `chats/{owner}/{peerPhone}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base64 JPEG of the peer's avatar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Most recent message of a conversation, already rendered for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub time: String,
    /// `None` for the sentinel
    pub at: Option<Timestamp>,
}

impl LastMessage {
    /// Placeholder used when a conversation has no message (or the lookup failed)
    pub fn sentinel(text: &str, time: &str) -> Self {
        Self {
            text: text.to_string(),
            time: time.to_string(),
            at: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.at.is_none()
    }
}

/// One row of the chat list: peer metadata joined with the last message
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub peer_name: String,
    pub peer_phone_number: String,
    pub peer_image: Option<ProfileImage>,
    pub last_message_text: String,
    pub last_message_time: String,
    pub last_message_at: Option<Timestamp>,
    pub peer_user_id: Option<String>,
}
