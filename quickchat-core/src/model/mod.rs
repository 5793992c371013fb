//! Data model shared by the three components

pub mod chat;
pub mod identity;
pub mod message;
pub mod types;

pub use chat::{ChatSummary, ConversationEntry, LastMessage};
pub use identity::{Identity, VerificationChallenge};
pub use message::{Message, MessageCopy, MessageRecord};
pub use types::Timestamp;
