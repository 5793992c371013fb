//! Handles for live listeners driven by a spawned task

use crate::backend::Subscription;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Keeps a live listener attached
///
/// Events are pumped from the backend subscription into the callback on a
/// tokio task. After [`detach`](Self::detach) (or drop) no further callback
/// fires, even for events already queued.
#[derive(Debug)]
pub struct ListenerHandle {
    label: String,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Drive `subscription` into `on_event` until the backend ends it or the
    /// handle is detached
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<E, F>(
        label: impl Into<String>,
        mut subscription: Subscription<E>,
        mut on_event: F,
    ) -> Self
    where
        E: Send + 'static,
        F: FnMut(E) + Send + 'static,
    {
        let label = label.into();
        let active = Arc::new(AtomicBool::new(true));

        let task = {
            let active = Arc::clone(&active);
            let label = label.clone();
            tokio::spawn(async move {
                while let Some(event) = subscription.next().await {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    on_event(event);
                }
                subscription.close();
                debug!(listener = %label, "Listener stopped");
            })
        };

        Self {
            label,
            active,
            task,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether callbacks can still fire
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stop delivering events
    pub fn detach(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.task.abort();
            debug!(listener = %self.label, "Listener detached");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
