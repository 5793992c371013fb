//! Test fixtures for creating common test objects

use crate::backend::memory::MemoryDatabase;
use crate::image_codec::ProfileImage;
use crate::model::Identity;
use image::{DynamicImage, GrayImage, Luma};
use serde_json::{json, Map, Value};

pub const ALICE: &str = "+15551234567";
pub const BOB: &str = "+15550000002";
pub const CAROL: &str = "+15550000003";

/// Uniform mid-gray image, survives a JPEG round trip unchanged
pub fn gray_image(width: u32, height: u32) -> ProfileImage {
    ProfileImage::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
        width,
        height,
        Luma([128]),
    )))
}

/// Signed-in identity for `phone_number` with a derived user id
pub fn identity(phone_number: &str) -> Identity {
    Identity {
        user_id: format!("uid-{}", phone_number.trim_start_matches('+')),
        phone_number: phone_number.to_string(),
        ..Default::default()
    }
}

/// Stored message payload
pub fn message_json(sender: &str, text: &str, millis: i64) -> Value {
    json!({
        "senderPhoneNumber": sender,
        "message": text,
        "timeStamp": millis,
    })
}

/// Builder for a database tree with conversations and messages
pub struct ChatTreeBuilder {
    owner: String,
    conversations: Map<String, Value>,
    messages: Map<String, Value>,
    next_id: usize,
}

impl ChatTreeBuilder {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            conversations: Map::new(),
            messages: Map::new(),
            next_id: 0,
        }
    }

    /// Conversation entry for `peer` with a display name
    pub fn conversation(mut self, peer: &str, name: &str) -> Self {
        self.conversations.insert(
            peer.to_string(),
            json!({ "name": name, "phoneNumber": peer }),
        );
        self
    }

    /// Conversation entry with a raw payload
    pub fn conversation_value(mut self, peer: &str, entry: Value) -> Self {
        self.conversations.insert(peer.to_string(), entry);
        self
    }

    /// Message in the owner's copy of the conversation with `peer`
    pub fn message(mut self, peer: &str, sender: &str, text: &str, millis: i64) -> Self {
        let id = format!("m{:04}", self.next_id);
        self.next_id += 1;

        let thread = self
            .messages
            .entry(peer.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(thread) = thread.as_object_mut() {
            thread.insert(id, message_json(sender, text, millis));
        }
        self
    }

    pub fn build_value(self) -> Value {
        let mut chats = Map::new();
        chats.insert(self.owner.clone(), Value::Object(self.conversations));
        let mut messages = Map::new();
        messages.insert(self.owner, Value::Object(self.messages));
        json!({ "chats": chats, "messages": messages })
    }

    pub fn build(self) -> MemoryDatabase {
        MemoryDatabase::with_data(self.build_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_tree_shape() {
        let tree = ChatTreeBuilder::new(ALICE)
            .conversation(BOB, "Bob")
            .message(BOB, BOB, "hey", 1_000)
            .build_value();

        assert_eq!(tree["chats"][ALICE][BOB]["name"], "Bob");
        assert_eq!(tree["messages"][ALICE][BOB]["m0000"]["message"], "hey");
        assert_eq!(tree["messages"][ALICE][BOB]["m0000"]["timeStamp"], 1_000);
    }

    #[test]
    fn test_identity_fixture() {
        let id = identity(ALICE);
        assert_eq!(id.user_id, "uid-15551234567");
        assert_eq!(id.phone_number, ALICE);
    }
}
