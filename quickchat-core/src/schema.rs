//! Storage layout of the realtime database
//!
//! ```text
//! users/{userId}                          Identity
//! chats/{ownerPhone}/{peerPhone}          ConversationEntry
//! messages/{ownerPhone}/{peerPhone}/{id}  Message
//! ```

use crate::backend::DbPath;

pub const USERS: &str = "users";
pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";

/// Field names used in queries
pub mod fields {
    pub const PHONE_NUMBER: &str = "phoneNumber";
    pub const SENDER_PHONE_NUMBER: &str = "senderPhoneNumber";
    pub const TIMESTAMP: &str = "timeStamp";
    pub const NAME: &str = "name";
    pub const IMAGE: &str = "image";
}

pub fn users() -> DbPath {
    DbPath::root().child(USERS)
}

pub fn user(user_id: &str) -> DbPath {
    users().child(user_id)
}

/// Conversation set of `owner`
pub fn conversations(owner_phone: &str) -> DbPath {
    DbPath::root().child(CHATS).child(owner_phone)
}

pub fn conversation(owner_phone: &str, peer_phone: &str) -> DbPath {
    conversations(owner_phone).child(peer_phone)
}

/// Every conversation thread stored for `owner`, keyed by peer
pub fn threads(owner_phone: &str) -> DbPath {
    DbPath::root().child(MESSAGES).child(owner_phone)
}

/// `owner`'s copy of the conversation with `peer`
pub fn messages(owner_phone: &str, peer_phone: &str) -> DbPath {
    threads(owner_phone).child(peer_phone)
}

pub fn message(owner_phone: &str, peer_phone: &str, message_id: &str) -> DbPath {
    messages(owner_phone, peer_phone).child(message_id)
}
