//! Shared read-only view of the signed-in identity

use crate::model::Identity;
use tokio::sync::watch;

/// Cloneable reader of the current [`Identity`]
///
/// Only [`AuthSession`](super::AuthSession) holds the writing side; chat
/// and messaging components receive a handle and read from it.
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    rx: watch::Receiver<Option<Identity>>,
}

impl IdentityHandle {
    pub(crate) fn channel() -> (watch::Sender<Option<Identity>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Handle pinned to a fixed identity, for components used without a session
    pub fn fixed(identity: Identity) -> Self {
        let (_tx, rx) = watch::channel(Some(identity));
        Self { rx }
    }

    pub fn current(&self) -> Option<Identity> {
        self.rx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.rx.borrow().as_ref().map(|i| i.user_id.clone())
    }

    pub fn phone_number(&self) -> Option<String> {
        self.rx
            .borrow()
            .as_ref()
            .map(|i| i.phone_number.clone())
            .filter(|p| !p.is_empty())
    }

    pub fn is_signed_in(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the next identity change; `false` once the session is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
