//! Live chat list: conversation entries joined with their last message

use crate::auth::IdentityHandle;
use crate::backend::{
    BackendError, ChildEvent, DataSnapshot, Query, RealtimeDatabase, Subscription, ValueEvent,
};
use crate::config::{ChatConfig, ClientConfig};
use crate::errors::{CoreError, CoreResult};
use crate::image_codec::decode_profile_image;
use crate::listener::ListenerHandle;
use crate::metrics::{
    Timer, CHAT_LIST_LOAD_DURATION_MS, CHAT_LIST_PUBLISHED, CHAT_LIST_SIZE, MESSAGES_RECEIVED,
};
use crate::model::{ChatSummary, ConversationEntry, LastMessage, Message};
use crate::schema::{self, fields};
use futures::future::join_all;
use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Builds chat list rows for one owner
///
/// Shared between the caller-facing [`ChatAggregator`] and its pipeline task.
struct Resolver {
    db: Arc<dyn RealtimeDatabase>,
    config: ChatConfig,
}

impl Resolver {
    /// Peers of `owner`: every conversation entry plus every thread that
    /// holds messages, in key order
    ///
    /// A peer with messages but no entry gets a default entry.
    fn peer_set(
        conversations: &DataSnapshot,
        threads: &DataSnapshot,
    ) -> BTreeMap<String, ConversationEntry> {
        let mut peers = BTreeMap::new();
        for peer in conversations.children() {
            let Some(phone_number) = peer.key().map(str::to_string) else {
                continue;
            };
            let entry = match peer.get::<ConversationEntry>() {
                Ok(entry) => entry.unwrap_or_default(),
                Err(e) => {
                    debug!(peer = %phone_number, error = %e, "Malformed conversation entry");
                    ConversationEntry::default()
                }
            };
            peers.insert(phone_number, entry);
        }
        for thread in threads.children() {
            if thread.children_count() == 0 {
                continue;
            }
            if let Some(phone_number) = thread.key() {
                peers.entry(phone_number.to_string()).or_default();
            }
        }
        peers
    }

    /// Join every peer with its last message
    ///
    /// All lookups run concurrently and the list is produced only once
    /// every one of them has finished. A failed lookup yields an empty list.
    async fn resolve(
        &self,
        owner: &str,
        peers: BTreeMap<String, ConversationEntry>,
    ) -> Vec<ChatSummary> {
        if peers.is_empty() {
            return Vec::new();
        }

        let timer = Timer::new(CHAT_LIST_LOAD_DURATION_MS);
        let rows: CoreResult<Vec<ChatSummary>> = join_all(
            peers
                .into_iter()
                .map(|(phone_number, entry)| self.resolve_peer(owner, phone_number, entry)),
        )
        .await
        .into_iter()
        .collect();
        timer.stop();

        match rows {
            Ok(mut rows) => {
                // Most recent first; the stable sort keeps key order for the rest
                rows.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
                rows
            }
            Err(e) => {
                warn!(owner, error = %e, "Chat list lookup failed");
                Vec::new()
            }
        }
    }

    async fn resolve_peer(
        &self,
        owner: &str,
        phone_number: String,
        entry: ConversationEntry,
    ) -> CoreResult<ChatSummary> {
        let last = self.last_message(owner, &phone_number).await?;

        Ok(ChatSummary {
            peer_name: entry
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.config.unknown_peer_name.clone()),
            peer_image: entry.image.as_deref().and_then(decode_profile_image),
            peer_user_id: entry.user_id,
            peer_phone_number: phone_number,
            last_message_text: last.text,
            last_message_time: last.time,
            last_message_at: last.at,
        })
    }

    async fn last_message(&self, owner: &str, peer: &str) -> CoreResult<LastMessage> {
        let query = Query::new()
            .order_by_child(fields::TIMESTAMP)
            .limit_to_last(1);
        let snapshot = self
            .db
            .read_once(&schema::messages(owner, peer), &query)
            .await?;

        let Some(latest) = snapshot.children().pop() else {
            return Ok(self.sentinel());
        };
        match latest.get::<Message>() {
            Ok(Some(message)) => Ok(self.render(message)),
            Ok(None) => Ok(self.sentinel()),
            Err(e) => {
                debug!(owner, peer, error = %e, "Malformed last message");
                Ok(self.sentinel())
            }
        }
    }

    fn render(&self, message: Message) -> LastMessage {
        let time = message
            .timestamp
            .format_clock(self.config.display_offset(), &self.config.time_format)
            .unwrap_or_else(|| self.config.no_message_time.clone());
        LastMessage {
            text: message.text,
            time,
            at: Some(message.timestamp),
        }
    }

    fn sentinel(&self) -> LastMessage {
        LastMessage::sentinel(&self.config.no_message_text, &self.config.no_message_time)
    }
}

/// Continuously updated chat list of the signed-in user
///
/// [`start`](Self::start) watches the owner's conversation set and message
/// threads and rebuilds the whole list whenever either changes; observers
/// get full replacements through [`subscribe`](Self::subscribe), never
/// partial rows.
pub struct ChatAggregator {
    resolver: Arc<Resolver>,
    identity: IdentityHandle,
    summaries: Arc<watch::Sender<Vec<ChatSummary>>>,
    pipeline: Mutex<Option<JoinHandle<()>>>,
}

impl ChatAggregator {
    pub fn new(db: Arc<dyn RealtimeDatabase>, identity: IdentityHandle) -> Self {
        let (summaries, _) = watch::channel(Vec::new());
        Self {
            resolver: Arc::new(Resolver {
                db,
                config: ChatConfig::default(),
            }),
            identity,
            summaries: Arc::new(summaries),
            pipeline: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.resolver = Arc::new(Resolver {
            db: Arc::clone(&self.resolver.db),
            config: config.chat.clone(),
        });
        self
    }

    /// Last published list
    pub fn current(&self) -> Vec<ChatSummary> {
        self.summaries.borrow().clone()
    }

    /// Observe every published list
    pub fn subscribe(&self) -> watch::Receiver<Vec<ChatSummary>> {
        self.summaries.subscribe()
    }

    /// Watch the signed-in user's conversations and messages and keep the
    /// list current
    ///
    /// Restarting replaces the previous pipeline. A change that arrives
    /// while a list is still being resolved supersedes it; if the backend
    /// cancels either watch, an empty list is published and the pipeline
    /// ends.
    pub async fn start(&self) -> CoreResult<()> {
        let owner = self.owner()?;
        self.stop();

        let db = &self.resolver.db;
        let sources = Sources {
            conversations: db
                .watch(&schema::conversations(&owner), &Query::new())
                .await?,
            threads: db.watch(&schema::threads(&owner), &Query::new()).await?,
        };

        let task = tokio::spawn(run_pipeline(
            Arc::clone(&self.resolver),
            Arc::clone(&self.summaries),
            owner.clone(),
            sources,
        ));
        *self.lock_pipeline() = Some(task);
        info!(owner = %owner, "Chat list pipeline started");
        Ok(())
    }

    /// Detach the live pipeline; the last published list stays readable
    pub fn stop(&self) {
        if let Some(task) = self.lock_pipeline().take() {
            task.abort();
            debug!("Chat list pipeline stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_pipeline()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// One-shot build of `owner`'s chat list; empty on any failure
    pub async fn load_chat_list(&self, owner: &str) -> Vec<ChatSummary> {
        let db = &self.resolver.db;
        let conversations_path = schema::conversations(owner);
        let threads_path = schema::threads(owner);
        let (conversations, threads) = tokio::join!(
            db.read(&conversations_path),
            db.read(&threads_path),
        );
        match (conversations, threads) {
            (Ok(conversations), Ok(threads)) => {
                let peers = Resolver::peer_set(&conversations, &threads);
                self.resolver.resolve(owner, peers).await
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(owner, error = %e, "Conversation lookup failed");
                Vec::new()
            }
        }
    }

    /// Most recent message between `owner` and `peer`; the sentinel when
    /// there is none or the lookup fails
    pub async fn fetch_last_message(&self, owner: &str, peer: &str) -> LastMessage {
        self.resolver
            .last_message(owner, peer)
            .await
            .unwrap_or_else(|e| {
                warn!(owner, peer, error = %e, "Last message lookup failed");
                self.resolver.sentinel()
            })
    }

    /// Deliver each message `peer` appends to the signed-in user's copy
    ///
    /// Edits and removals on the feed are ignored; a revoked feed is
    /// logged and not reattached.
    pub async fn watch_incoming<F>(
        &self,
        peer: &str,
        mut on_message: F,
    ) -> CoreResult<ListenerHandle>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let owner = self.owner()?;
        let query = Query::new()
            .order_by_child(fields::SENDER_PHONE_NUMBER)
            .equal_to(peer);
        let subscription: Subscription<ChildEvent> = self
            .resolver
            .db
            .subscribe(&schema::messages(&owner, peer), &query)
            .await?;

        let label = format!("incoming {}", peer);
        let peer = peer.to_string();
        Ok(ListenerHandle::spawn(label, subscription, move |event| match event {
            ChildEvent::Added(snapshot) => match snapshot.get::<Message>() {
                Ok(Some(message)) => {
                    counter!(MESSAGES_RECEIVED).increment(1);
                    on_message(message);
                }
                Ok(None) => {}
                Err(e) => debug!(peer = %peer, error = %e, "Skipping malformed message"),
            },
            ChildEvent::Changed(_) | ChildEvent::Removed(_) => {}
            ChildEvent::Cancelled(e) => warn!(peer = %peer, error = %e, "Incoming feed cancelled"),
        }))
    }

    fn owner(&self) -> CoreResult<String> {
        self.identity
            .phone_number()
            .ok_or_else(|| CoreError::PreconditionFailed("not signed in".to_string()))
    }

    fn lock_pipeline(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pipeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChatAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The two live inputs of the chat list
struct Sources {
    conversations: Subscription<ValueEvent>,
    threads: Subscription<ValueEvent>,
}

enum Change {
    Conversations(DataSnapshot),
    Threads(DataSnapshot),
    Cancelled(BackendError),
    Closed,
}

impl Sources {
    async fn next(&mut self) -> Change {
        tokio::select! {
            event = self.conversations.next() => Self::classify(event, Change::Conversations),
            event = self.threads.next() => Self::classify(event, Change::Threads),
        }
    }

    fn classify(event: Option<ValueEvent>, value: fn(DataSnapshot) -> Change) -> Change {
        match event {
            None => Change::Closed,
            Some(ValueEvent::Cancelled(e)) => Change::Cancelled(e),
            Some(ValueEvent::Value(snapshot)) => value(snapshot),
        }
    }
}

async fn run_pipeline(
    resolver: Arc<Resolver>,
    summaries: Arc<watch::Sender<Vec<ChatSummary>>>,
    owner: String,
    mut sources: Sources,
) {
    let mut conversations = None;
    let mut threads = None;
    let mut next = sources.next().await;
    loop {
        match next {
            Change::Closed => break,
            Change::Cancelled(e) => {
                warn!(owner = %owner, error = %e, "Chat list watch cancelled");
                publish(&summaries, Vec::new());
                break;
            }
            Change::Conversations(snapshot) => conversations = Some(snapshot),
            Change::Threads(snapshot) => threads = Some(snapshot),
        }

        // Both initial values are delivered on attach
        let (Some(chats), Some(messages)) = (&conversations, &threads) else {
            next = sources.next().await;
            continue;
        };

        let resolution = resolver.resolve(&owner, Resolver::peer_set(chats, messages));
        tokio::pin!(resolution);
        let superseded = tokio::select! {
            rows = &mut resolution => {
                publish(&summaries, rows);
                None
            }
            change = sources.next() => Some(change),
        };
        next = match superseded {
            Some(change) => {
                debug!(owner = %owner, "Chat list resolution superseded");
                change
            }
            None => sources.next().await,
        };
    }
    debug!(owner = %owner, "Chat list pipeline finished");
}

fn publish(summaries: &watch::Sender<Vec<ChatSummary>>, rows: Vec<ChatSummary>) {
    counter!(CHAT_LIST_PUBLISHED).increment(1);
    gauge!(CHAT_LIST_SIZE).set(rows.len() as f64);
    debug!(rows = rows.len(), "Publishing chat list");
    summaries.send_replace(rows);
}
