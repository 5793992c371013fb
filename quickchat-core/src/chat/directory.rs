//! User lookup and conversation entries

use crate::auth::IdentityHandle;
use crate::backend::{DataSnapshot, Query, RealtimeDatabase};
use crate::errors::{CoreError, CoreResult};
use crate::model::{ConversationEntry, Identity};
use crate::schema::{self, fields};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Finds users by phone number and maintains the owner's conversation set
///
/// Lookups never fail: backend errors are logged and read as "nothing found".
pub struct ChatDirectory {
    db: Arc<dyn RealtimeDatabase>,
    identity: IdentityHandle,
}

impl ChatDirectory {
    pub fn new(db: Arc<dyn RealtimeDatabase>, identity: IdentityHandle) -> Self {
        Self { db, identity }
    }

    /// Profile of the user registered with `phone_number`
    ///
    /// Only available while signed in.
    pub async fn find_user_by_phone(&self, phone_number: &str) -> Option<Identity> {
        if !self.identity.is_signed_in() {
            warn!("User lookup attempted while signed out");
            return None;
        }

        let query = Query::new()
            .order_by_child(fields::PHONE_NUMBER)
            .equal_to(phone_number);
        let snapshot = match self.db.read_once(&schema::users(), &query).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(phone_number, error = %e, "User lookup failed");
                return None;
            }
        };

        let found = snapshot.children().into_iter().next()?;
        match found.get::<Identity>() {
            Ok(identity) => identity,
            Err(e) => {
                debug!(phone_number, error = %e, "Ignoring malformed user record");
                None
            }
        }
    }

    /// Conversation entries of `owner`, keyed by peer phone number, in key order
    pub async fn conversation_entries(&self, owner: &str) -> Vec<(String, ConversationEntry)> {
        match self.db.read(&schema::conversations(owner)).await {
            Ok(snapshot) => snapshot.children().iter().filter_map(decode_entry).collect(),
            Err(e) => {
                warn!(owner, error = %e, "Conversation lookup failed");
                Vec::new()
            }
        }
    }

    /// Store `entry` under `owner`'s conversations, keyed by its phone number
    pub async fn add_conversation(&self, owner: &str, entry: &ConversationEntry) -> CoreResult<()> {
        let peer = entry
            .phone_number
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                CoreError::PreconditionFailed("conversation entry has no phone number".to_string())
            })?;

        self.db
            .write(
                &schema::conversation(owner, peer),
                serde_json::to_value(entry)?,
            )
            .await?;
        info!(owner, peer, "Conversation added");
        Ok(())
    }

    /// Look up `peer_phone` and add it to `owner`'s conversations
    ///
    /// Returns the stored entry, or `None` when no user has that number.
    pub async fn add_contact(
        &self,
        owner: &str,
        peer_phone: &str,
    ) -> CoreResult<Option<ConversationEntry>> {
        let Some(user) = self.find_user_by_phone(peer_phone).await else {
            debug!(peer_phone, "No user registered with this number");
            return Ok(None);
        };

        let entry = entry_for(&user, peer_phone);
        self.add_conversation(owner, &entry).await?;
        Ok(Some(entry))
    }
}

fn decode_entry(child: &DataSnapshot) -> Option<(String, ConversationEntry)> {
    let peer = child.key()?.to_string();
    match child.get::<ConversationEntry>() {
        Ok(entry) => Some((peer, entry.unwrap_or_default())),
        Err(e) => {
            debug!(peer = %peer, error = %e, "Skipping malformed conversation entry");
            None
        }
    }
}

fn entry_for(user: &Identity, peer_phone: &str) -> ConversationEntry {
    ConversationEntry {
        name: Some(user.name.clone()).filter(|n| !n.trim().is_empty()),
        image: user.profile_image.clone(),
        phone_number: Some(peer_phone.to_string()),
        user_id: Some(user.user_id.clone()).filter(|id| !id.is_empty()),
    }
}
