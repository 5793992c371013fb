//! In-memory walkthrough of sign-in, contacts, messaging and the chat list

use anyhow::{bail, Context, Result};
use quickchat_core::backend::memory::{MemoryDatabase, MemoryPhoneAuth};
use quickchat_core::backend::{DeliveryContext, FileFlagStore, FlagStore, MemoryFlagStore};
use quickchat_core::config::ClientConfig;
use quickchat_core::model::Message;
use quickchat_core::{AuthSession, AuthState, ChatAggregator, ChatDirectory, MessageChannel};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const DEMO_CODE: &str = "123456";
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

async fn sign_in(
    db: Arc<MemoryDatabase>,
    flags: Arc<dyn FlagStore>,
    config: &ClientConfig,
    phone_number: &str,
    name: &str,
) -> Result<AuthSession> {
    let auth = Arc::new(MemoryPhoneAuth::new().with_code(phone_number, DEMO_CODE));
    let session = AuthSession::new(auth, db, flags).with_config(config);

    session
        .submit_phone_number(phone_number, &DeliveryContext::sms())
        .await?;
    let state = session.submit_code(DEMO_CODE).await?;
    let identity = match state {
        AuthState::Authenticated(identity) => identity,
        other => bail!(
            "sign-in of {} ended in state '{}'",
            phone_number,
            other.name()
        ),
    };

    session
        .save_profile(&identity.user_id, name, "Available", None)
        .await?;
    info!(phone_number, user_id = %identity.user_id, "Demo user signed in");
    Ok(session)
}

/// Run the walkthrough and describe what happened
pub async fn run(config: &ClientConfig, from: &str, to: &str, text: &str) -> Result<String> {
    let db = Arc::new(MemoryDatabase::new());
    let flags: Arc<dyn FlagStore> = Arc::new(
        FileFlagStore::open(config.storage.flags_path()).context("opening flag store")?,
    );

    let sender = sign_in(db.clone(), flags, config, from, "Sender").await?;
    let _receiver = sign_in(
        db.clone(),
        Arc::new(MemoryFlagStore::new()),
        config,
        to,
        "Receiver",
    )
    .await?;

    let directory = ChatDirectory::new(db.clone(), sender.identity());
    if directory.add_contact(from, to).await?.is_none() {
        bail!("{} is not registered", to);
    }

    let messages = MessageChannel::new(db.clone());
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let feed = messages
        .receive(to, from, move |message| {
            let _ = tx.send(message);
        })
        .await?;

    let record = messages.send(from, to, text).await?;
    let delivered = tokio::time::timeout(RECEIVE_TIMEOUT, rx.recv())
        .await
        .context("message not delivered in time")?
        .context("message feed closed")?;
    feed.detach();

    let chats = ChatAggregator::new(db.clone(), sender.identity()).with_config(config);
    let list = chats.load_chat_list(from).await;

    let mut report = String::new();
    writeln!(report, "signed in: {} and {}", from, to)?;
    writeln!(report, "sent {}: {:?}", record.id, record.message.text)?;
    writeln!(
        report,
        "{} received: {:?} from {}",
        to, delivered.text, delivered.sender_phone_number
    )?;
    writeln!(report, "chat list of {}:", from)?;
    for row in &list {
        writeln!(
            report,
            "  {} ({})  {}  {}",
            row.peer_name, row.peer_phone_number, row.last_message_time, row.last_message_text
        )?;
    }
    Ok(report.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_demo_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        let report = run(&config, "+15551234567", "+15550000002", "hello")
            .await
            .unwrap();
        assert!(report.contains("+15550000002 received: \"hello\" from +15551234567"));
        assert!(report.contains("Receiver (+15550000002)"));

        // The sender's sign-in was persisted
        assert!(crate::tools::signed_in(&config).unwrap());
    }

    #[tokio::test]
    async fn test_demo_rejects_invalid_number() {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        assert!(run(&config, "not-a-number", "+15550000002", "hello")
            .await
            .is_err());
    }
}
