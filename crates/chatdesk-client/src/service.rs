use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chatdesk_cache::MessageStore;
use chatdesk_transport::{ChatTransport, FixtureBackend};
use chatdesk_types::{Message, MessageStatus, Sender};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::signal;
use tracing::{error, info};

use crate::config::Config;
use crate::session::{ChatHandle, ChatSession};

/// Client service - wires config, logging, store, transport, and session
/// together. Runs a scripted exchange against the in-process fixture
/// backend; a real deployment swaps the fixture for a wire transport and
/// drives the handle from the UI instead of a script.
pub struct ChatClientService {
    config: Config,
}

impl ChatClientService {
    /// Create a new client service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the client service
    pub async fn run(self) -> Result<()> {
        chatdesk_logging::init_logging(&self.config.logging.level)?;
        info!("Starting ChatDesk client");
        info!(
            "Session config: page_size={}, reconnect_delay={}s",
            self.config.chat.page_size, self.config.reconnect.delay_secs
        );

        let backend = Arc::new(FixtureBackend::new());
        let history = seed_history();
        info!("Fixture backend seeded with {} messages", history.len());
        backend.seed(history);

        let store = Arc::new(MessageStore::new());
        let (handle, join) = ChatSession::spawn(
            backend.clone() as Arc<dyn ChatTransport>,
            store,
            self.config.session_options(),
        );

        // Setup signal handler for graceful shutdown
        let shutdown = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
            info!("Received shutdown signal");
        };

        tokio::select! {
            result = run_script(handle.clone(), backend.clone()) => {
                if let Err(e) = result {
                    error!("Scripted exchange error: {}", e);
                }
            }
            _ = shutdown => {
                info!("Shutting down gracefully...");
            }
        }

        handle.shutdown();
        let _ = join.await;
        info!("ChatDesk client stopped");
        Ok(())
    }
}

fn seed_history() -> Vec<Message> {
    let base = Utc::now() - ChronoDuration::minutes(30);
    [
        (Sender::Customer, "Hi, my order hasn't arrived yet."),
        (Sender::Admin, "Sorry to hear that! Let me check."),
        (Sender::Customer, "The order number is 58212."),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (sender, text))| {
        Message::new(
            (index + 1).to_string(),
            text,
            MessageStatus::Read,
            base + ChronoDuration::minutes(index as i64),
            sender,
        )
    })
    .collect()
}

/// A short support exchange exercising load, optimistic send, pushes, and
/// the scrolled-away counter.
async fn run_script(handle: ChatHandle, backend: Arc<FixtureBackend>) -> Result<()> {
    let mut snapshots = handle.snapshots();
    while snapshots.borrow_and_update().messages.is_empty() {
        snapshots.changed().await?;
    }
    info!("Loaded {} messages", handle.snapshot().messages.len());

    handle
        .submit("Found it - the parcel left our warehouse yesterday.")
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!(
        "After send: {} messages, {} pending",
        handle.snapshot().messages.len(),
        handle.snapshot().pending_sends
    );

    // The customer reads our reply; the updated stream advances its status.
    if let Some(read) = backend.mark_read("4") {
        info!(id = %read.id, "customer read our reply");
    }

    backend.customer_says("Great, thanks for checking!");
    handle.set_at_bottom(false).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    backend.customer_says("One more thing - can I still change the address?");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = handle.snapshot();
    info!(
        "{} messages, {} new while scrolled away",
        snapshot.messages.len(),
        snapshot.new_while_away
    );

    handle.set_at_bottom(true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        "Back at bottom, counter reset to {}",
        handle.snapshot().new_while_away
    );
    Ok(())
}
