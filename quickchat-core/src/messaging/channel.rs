//! Dual-written point-to-point messages

use crate::backend::{ChildEvent, Query, RealtimeDatabase};
use crate::errors::{CoreError, CoreResult};
use crate::listener::ListenerHandle;
use crate::metrics::{MESSAGES_PARTIAL, MESSAGES_RECEIVED, MESSAGES_SENT};
use crate::model::{Message, MessageCopy, MessageRecord};
use crate::schema;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends and receives messages between two phone numbers
///
/// Every message is stored twice, once in each participant's subtree, under
/// the same id. The two writes are independent: there is no transaction
/// across them, and a failure of either is reported as
/// [`CoreError::PartialDelivery`].
pub struct MessageChannel {
    db: Arc<dyn RealtimeDatabase>,
}

impl MessageChannel {
    pub fn new(db: Arc<dyn RealtimeDatabase>) -> Self {
        Self { db }
    }

    /// Append `text` from `sender` to the conversation with `receiver`
    pub async fn send(&self, sender: &str, receiver: &str, text: &str) -> CoreResult<MessageRecord> {
        if sender.trim().is_empty() || receiver.trim().is_empty() {
            return Err(CoreError::PreconditionFailed(
                "sender and receiver are required".to_string(),
            ));
        }

        let id = self.db.push_id(&schema::messages(sender, receiver));
        let message = Message::new(sender, text);
        let payload = serde_json::to_value(&message)?;

        let sender_path = schema::message(sender, receiver, &id);
        let receiver_path = schema::message(receiver, sender, &id);
        let (sender_view, receiver_view) = tokio::join!(
            self.db.write(&sender_path, payload.clone()),
            self.db.write(&receiver_path, payload),
        );

        let mut failed = Vec::new();
        if let Err(e) = sender_view {
            warn!(message_id = %id, sender, receiver, error = %e, "Sender copy not stored");
            failed.push(MessageCopy::SenderView);
        }
        if let Err(e) = receiver_view {
            warn!(message_id = %id, sender, receiver, error = %e, "Receiver copy not stored");
            failed.push(MessageCopy::ReceiverView);
        }
        if !failed.is_empty() {
            counter!(MESSAGES_PARTIAL).increment(1);
            return Err(CoreError::PartialDelivery {
                message_id: id,
                failed,
            });
        }

        counter!(MESSAGES_SENT).increment(1);
        debug!(message_id = %id, sender, receiver, "Message sent");
        Ok(MessageRecord { id, message })
    }

    /// Call `on_message` for every message in `owner`'s copy of the
    /// conversation with `peer`, in arrival order
    ///
    /// Messages already stored are delivered first, then new ones as they
    /// are appended. Edits and removals are ignored.
    pub async fn receive<F>(
        &self,
        owner: &str,
        peer: &str,
        mut on_message: F,
    ) -> CoreResult<ListenerHandle>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let subscription = self
            .db
            .subscribe(&schema::messages(owner, peer), &Query::new())
            .await?;

        let label = format!("messages {}/{}", owner, peer);
        let thread = label.clone();
        Ok(ListenerHandle::spawn(label, subscription, move |event| match event {
            ChildEvent::Added(snapshot) => match snapshot.get::<Message>() {
                Ok(Some(message)) => {
                    counter!(MESSAGES_RECEIVED).increment(1);
                    on_message(message);
                }
                Ok(None) => {}
                Err(e) => debug!(thread = %thread, error = %e, "Skipping malformed message"),
            },
            ChildEvent::Changed(_) | ChildEvent::Removed(_) => {}
            ChildEvent::Cancelled(e) => warn!(thread = %thread, error = %e, "Message feed cancelled"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryDatabase;
    use crate::backend::BackendError;
    use crate::test_utils::{
        collect_n, recv_timeout, ALICE, BOB, DEFAULT_TEST_TIMEOUT, SHORT_TEST_TIMEOUT,
    };
    use tokio::sync::mpsc;

    fn channel() -> (Arc<MemoryDatabase>, MessageChannel) {
        let db = Arc::new(MemoryDatabase::new());
        (db.clone(), MessageChannel::new(db))
    }

    async fn listen(
        channel: &MessageChannel,
        owner: &str,
        peer: &str,
    ) -> (ListenerHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = channel
            .receive(owner, peer, move |message| {
                let _ = tx.send(message);
            })
            .await
            .unwrap();
        (handle, rx)
    }

    #[tokio::test]
    async fn test_both_participants_see_identical_message() {
        let (_db, channel) = channel();
        let (_alice_handle, mut alice_rx) = listen(&channel, ALICE, BOB).await;
        let (_bob_handle, mut bob_rx) = listen(&channel, BOB, ALICE).await;

        let record = channel.send(ALICE, BOB, "hi").await.unwrap();

        let alice_copy = recv_timeout(&mut alice_rx, DEFAULT_TEST_TIMEOUT).await.unwrap();
        let bob_copy = recv_timeout(&mut bob_rx, DEFAULT_TEST_TIMEOUT).await.unwrap();
        assert_eq!(alice_copy, record.message);
        assert_eq!(bob_copy, record.message);
        assert_eq!(bob_copy.sender_phone_number, ALICE);
        assert_eq!(bob_copy.text, "hi");
        assert_eq!(alice_copy.timestamp, bob_copy.timestamp);
    }

    #[tokio::test]
    async fn test_copies_share_id() {
        let (db, channel) = channel();
        let record = channel.send(ALICE, BOB, "hi").await.unwrap();

        let mine = db.value_at(&schema::message(ALICE, BOB, &record.id));
        let theirs = db.value_at(&schema::message(BOB, ALICE, &record.id));
        assert_eq!(mine, theirs);
        assert_eq!(mine["message"], "hi");
    }

    #[tokio::test]
    async fn test_arrival_order_preserved() {
        let (_db, channel) = channel();
        for text in ["one", "two", "three"] {
            channel.send(ALICE, BOB, text).await.unwrap();
        }

        // Stored messages are delivered on attach, in append order
        let (_handle, mut rx) = listen(&channel, BOB, ALICE).await;
        let texts: Vec<String> = collect_n(&mut rx, 3, DEFAULT_TEST_TIMEOUT)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_partial_delivery_reported() {
        let (db, channel) = channel();
        db.fail_writes_under(
            schema::messages(BOB, ALICE),
            BackendError::Unavailable("offline".into()),
        );

        let err = channel.send(ALICE, BOB, "hi").await.unwrap_err();
        let CoreError::PartialDelivery { message_id, failed } = err else {
            panic!("expected partial delivery, got {:?}", err);
        };
        assert_eq!(failed, vec![MessageCopy::ReceiverView]);
        // The sender's copy is not rolled back
        assert_eq!(
            db.value_at(&schema::message(ALICE, BOB, &message_id))["message"],
            "hi"
        );
        assert!(db.value_at(&schema::message(BOB, ALICE, &message_id)).is_null());
    }

    #[tokio::test]
    async fn test_detached_listener_stays_silent() {
        let (_db, channel) = channel();
        let (handle, mut rx) = listen(&channel, BOB, ALICE).await;
        handle.detach();

        channel.send(ALICE, BOB, "hi").await.unwrap();
        assert!(recv_timeout(&mut rx, SHORT_TEST_TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn test_send_requires_participants() {
        let (db, channel) = channel();
        assert!(matches!(
            channel.send("", BOB, "hi").await,
            Err(CoreError::PreconditionFailed(_))
        ));
        assert_eq!(db.write_count(), 0);
    }
}
