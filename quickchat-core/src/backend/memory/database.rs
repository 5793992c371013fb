//! In-memory realtime database
//!
//! Keeps the whole tree as one JSON value and mimics the listener semantics
//! of the hosted service: child listeners replay existing children as
//! `Added` on attach, value listeners receive the current value first, and
//! every write diffs the affected listeners. Tests can inject read/write
//! failures, revoke listeners and pause reads to observe in-flight states.

use crate::backend::{
    BackendError, BackendResult, ChildEvent, DataSnapshot, DbPath, Query, RealtimeDatabase,
    Subscription, ValueEvent,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

struct ChildListener {
    path: DbPath,
    query: Query,
    known: BTreeMap<String, Value>,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

struct ValueListener {
    path: DbPath,
    query: Query,
    last: DataSnapshot,
    tx: mpsc::UnboundedSender<ValueEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    child_listeners: Vec<ChildListener>,
    value_listeners: Vec<ValueListener>,
    read_failures: Vec<(DbPath, BackendError)>,
    write_failures: Vec<(DbPath, BackendError)>,
    last_push_millis: u64,
    push_seq: u64,
}

/// Call counters, for asserting how often the backend was contacted
#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    subscriptions: AtomicUsize,
}

/// In-process [`RealtimeDatabase`]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
    reads_paused: watch::Sender<bool>,
    counters: Counters,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        let (reads_paused, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                root: Value::Null,
                ..Default::default()
            }),
            reads_paused,
            counters: Counters::default(),
        }
    }

    /// Create a database pre-populated with `root`
    pub fn with_data(root: Value) -> Self {
        let db = Self::new();
        if let Ok(mut inner) = db.inner.lock() {
            inner.root = normalize(root);
        }
        db
    }

    /// Whole tree, for assertions
    pub fn dump(&self) -> Value {
        self.lock().map(|inner| inner.root.clone()).unwrap_or(Value::Null)
    }

    /// Value stored at `path`, `Value::Null` if absent
    pub fn value_at(&self, path: &DbPath) -> Value {
        self.lock()
            .map(|inner| value_at(&inner.root, path).cloned().unwrap_or(Value::Null))
            .unwrap_or(Value::Null)
    }

    /// Make reads, queries and listener attaches under `prefix` fail
    pub fn fail_reads_under(&self, prefix: impl Into<DbPath>, error: BackendError) {
        if let Ok(mut inner) = self.lock() {
            inner.read_failures.push((prefix.into(), error));
        }
    }

    /// Make writes under `prefix` fail
    pub fn fail_writes_under(&self, prefix: impl Into<DbPath>, error: BackendError) {
        if let Ok(mut inner) = self.lock() {
            inner.write_failures.push((prefix.into(), error));
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.read_failures.clear();
            inner.write_failures.clear();
        }
    }

    /// Revoke every listener attached at or below `prefix`
    ///
    /// Each revoked listener receives a final `Cancelled(error)` event.
    /// Returns how many listeners were revoked.
    pub fn cancel_listeners_under(&self, prefix: impl Into<DbPath>, error: BackendError) -> usize {
        let prefix = prefix.into();
        let Ok(mut inner) = self.lock() else {
            return 0;
        };

        let mut revoked = 0;
        inner.child_listeners.retain(|l| {
            if prefix.is_ancestor_of(&l.path) {
                let _ = l.tx.send(ChildEvent::Cancelled(error.clone()));
                revoked += 1;
                false
            } else {
                true
            }
        });
        inner.value_listeners.retain(|l| {
            if prefix.is_ancestor_of(&l.path) {
                let _ = l.tx.send(ValueEvent::Cancelled(error.clone()));
                revoked += 1;
                false
            } else {
                true
            }
        });

        debug!(prefix = %prefix, revoked, "Revoked listeners");
        revoked
    }

    /// Hold every `read`/`read_once` until [`resume_reads`](Self::resume_reads)
    pub fn pause_reads(&self) {
        self.reads_paused.send_replace(true);
    }

    pub fn resume_reads(&self) {
        self.reads_paused.send_replace(false);
    }

    /// Number of `read`/`read_once` calls so far
    pub fn read_count(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of `write` calls so far
    pub fn write_count(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Number of listener attaches so far
    pub fn subscription_count(&self) -> usize {
        self.counters.subscriptions.load(Ordering::SeqCst)
    }

    /// Listeners still attached
    pub fn active_listeners(&self) -> usize {
        self.lock()
            .map(|inner| {
                inner.child_listeners.iter().filter(|l| !l.tx.is_closed()).count()
                    + inner.value_listeners.iter().filter(|l| !l.tx.is_closed()).count()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> BackendResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Unavailable("database lock poisoned".to_string()))
    }

    async fn wait_until_reads_allowed(&self) {
        let mut rx = self.reads_paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    fn check_failure(failures: &[(DbPath, BackendError)], path: &DbPath) -> BackendResult<()> {
        match failures.iter().find(|(prefix, _)| prefix.is_ancestor_of(path)) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeDatabase for MemoryDatabase {
    async fn read(&self, path: &DbPath) -> BackendResult<DataSnapshot> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        path.validate()?;
        self.wait_until_reads_allowed().await;

        let inner = self.lock()?;
        Self::check_failure(&inner.read_failures, path)?;
        let value = value_at(&inner.root, path).cloned().unwrap_or(Value::Null);
        trace!(path = %path, "read");
        Ok(DataSnapshot::new(path.key().map(str::to_string), value))
    }

    async fn read_once(&self, path: &DbPath, query: &Query) -> BackendResult<DataSnapshot> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        path.validate()?;
        self.wait_until_reads_allowed().await;

        let inner = self.lock()?;
        Self::check_failure(&inner.read_failures, path)?;
        trace!(path = %path, ?query, "read_once");
        Ok(query_snapshot(&inner.root, path, query))
    }

    async fn subscribe(
        &self,
        path: &DbPath,
        query: &Query,
    ) -> BackendResult<Subscription<ChildEvent>> {
        self.counters.subscriptions.fetch_add(1, Ordering::SeqCst);
        path.validate()?;

        let mut inner = self.lock()?;
        Self::check_failure(&inner.read_failures, path)?;

        let (tx, subscription) = Subscription::channel();
        let node = value_at(&inner.root, path).cloned().unwrap_or(Value::Null);
        let mut known = BTreeMap::new();
        for (key, value) in query.apply(&node) {
            let _ = tx.send(ChildEvent::Added(DataSnapshot::new(
                Some(key.clone()),
                value.clone(),
            )));
            known.insert(key, value);
        }

        debug!(path = %path, replayed = known.len(), "Child listener attached");
        inner.child_listeners.push(ChildListener {
            path: path.clone(),
            query: query.clone(),
            known,
            tx,
        });
        Ok(subscription)
    }

    async fn watch(&self, path: &DbPath, query: &Query) -> BackendResult<Subscription<ValueEvent>> {
        self.counters.subscriptions.fetch_add(1, Ordering::SeqCst);
        path.validate()?;

        let mut inner = self.lock()?;
        Self::check_failure(&inner.read_failures, path)?;

        let (tx, subscription) = Subscription::channel();
        let snapshot = query_snapshot(&inner.root, path, query);
        let _ = tx.send(ValueEvent::Value(snapshot.clone()));

        debug!(path = %path, "Value listener attached");
        inner.value_listeners.push(ValueListener {
            path: path.clone(),
            query: query.clone(),
            last: snapshot,
            tx,
        });
        Ok(subscription)
    }

    async fn write(&self, path: &DbPath, value: Value) -> BackendResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        path.validate()?;
        validate_keys(path, &value)?;

        let mut inner = self.lock()?;
        Self::check_failure(&inner.write_failures, path)?;

        set_at(&mut inner.root, path.segments(), normalize(value));
        trace!(path = %path, "write");
        notify(&mut inner, path);
        Ok(())
    }

    fn push_id(&self, _path: &DbPath) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let Ok(mut inner) = self.inner.lock() else {
            return format!("-{:012x}{}", now, uuid::Uuid::new_v4().simple());
        };
        inner.last_push_millis = inner.last_push_millis.max(now);
        inner.push_seq += 1;
        format!("-{:012x}{:08x}", inner.last_push_millis, inner.push_seq)
    }
}

/// Deliver diffs to every listener whose location overlaps `changed`
fn notify(inner: &mut Inner, changed: &DbPath) {
    let Inner {
        root,
        child_listeners,
        value_listeners,
        ..
    } = inner;
    let root: &Value = root;

    child_listeners.retain_mut(|listener| {
        if listener.tx.is_closed() {
            return false;
        }
        if !listener.path.overlaps(changed) {
            return true;
        }

        let node = value_at(root, &listener.path).cloned().unwrap_or(Value::Null);
        let current = listener.query.apply(&node);
        let mut events = Vec::new();

        let current_keys: Vec<&String> = current.iter().map(|(k, _)| k).collect();
        for (key, old) in &listener.known {
            if !current_keys.contains(&key) {
                events.push(ChildEvent::Removed(DataSnapshot::new(
                    Some(key.clone()),
                    old.clone(),
                )));
            }
        }
        for (key, value) in &current {
            match listener.known.get(key) {
                None => events.push(ChildEvent::Added(DataSnapshot::new(
                    Some(key.clone()),
                    value.clone(),
                ))),
                Some(old) if old != value => events.push(ChildEvent::Changed(
                    DataSnapshot::new(Some(key.clone()), value.clone()),
                )),
                Some(_) => {}
            }
        }

        listener.known = current.into_iter().collect();
        events.into_iter().all(|event| listener.tx.send(event).is_ok())
    });

    value_listeners.retain_mut(|listener| {
        if listener.tx.is_closed() {
            return false;
        }
        if !listener.path.overlaps(changed) {
            return true;
        }

        let snapshot = query_snapshot(root, &listener.path, &listener.query);
        if snapshot == listener.last {
            return true;
        }
        listener.last = snapshot.clone();
        listener.tx.send(ValueEvent::Value(snapshot)).is_ok()
    });
}

fn query_snapshot(root: &Value, path: &DbPath, query: &Query) -> DataSnapshot {
    let key = path.key().map(str::to_string);
    let node = value_at(root, path).cloned().unwrap_or(Value::Null);
    if query.is_unfiltered() {
        DataSnapshot::new(key, node)
    } else {
        DataSnapshot::from_ordered(key, query.apply(&node))
    }
}

fn value_at<'a>(root: &'a Value, path: &DbPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.get(segment.as_str()))
}

fn set_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if value.is_null() && !node.is_object() {
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Some(map) = node.as_object_mut() else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.remove(first);
        } else {
            map.insert(first.clone(), value);
        }
    } else {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
    }
}

/// Drop null leaves and empty objects, as the hosted database does
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn validate_keys(path: &DbPath, value: &Value) -> BackendResult<()> {
    if let Value::Object(map) = value {
        for (key, child) in map {
            let child_path = path.child(key.clone());
            child_path.validate()?;
            validate_keys(&child_path, child)?;
        }
    }
    Ok(())
}
