//! Live listener streams delivered by the database

use super::error::BackendError;
use super::snapshot::DataSnapshot;
use tokio::sync::mpsc;

/// Per-child events on a subscribed location
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// A child appeared (existing children are replayed on attach)
    Added(DataSnapshot),
    /// An existing child's value changed
    Changed(DataSnapshot),
    /// A child was deleted
    Removed(DataSnapshot),
    /// The backend revoked the listener; no further events follow
    Cancelled(BackendError),
}

/// Whole-value events on a watched location
#[derive(Debug, Clone, PartialEq)]
pub enum ValueEvent {
    /// Current value; sent once on attach and after each change
    Value(DataSnapshot),
    /// The backend revoked the listener; no further events follow
    Cancelled(BackendError),
}

/// Receiving end of a database listener
///
/// Dropping the subscription detaches the listener; the backend prunes
/// closed senders on its next delivery.
#[derive(Debug)]
pub struct Subscription<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Create a connected sender/subscription pair
    pub fn channel() -> (mpsc::UnboundedSender<E>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next event in delivery order, `None` once the backend dropped the listener
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Event already queued, without waiting
    pub fn try_next(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new events
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_in_send_order() {
        let (tx, mut sub) = Subscription::channel();
        for i in 0..3 {
            tx.send(ChildEvent::Added(DataSnapshot::new(
                Some(format!("k{}", i)),
                json!(i),
            )))
            .unwrap();
        }
        drop(tx);

        let mut keys = Vec::new();
        while let Some(ChildEvent::Added(snap)) = sub.next().await {
            keys.push(snap.key().unwrap().to_string());
        }
        assert_eq!(keys, vec!["k0", "k1", "k2"]);
    }

    #[tokio::test]
    async fn test_close_marks_sender_closed() {
        let (tx, mut sub) = Subscription::<ValueEvent>::channel();
        assert!(!tx.is_closed());
        sub.close();
        assert!(tx.is_closed());
    }
}
