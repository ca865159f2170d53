//! The chat session: one task that owns the store and serializes every
//! inbound event through it.
//!
//! Page fetches, send acknowledgments, and the two push streams all converge
//! here. The loop handles each event to completion before the next, so the
//! reconciliation functions never see interleaved partial reads; ordering
//! conflicts between channels are resolved by the freshness rule alone.

use std::sync::Arc;
use std::time::Duration;

use chatdesk_cache::{
    apply_confirmed, upsert_by_freshness, MergeDirection, MessageStore, UpsertOutcome,
};
use chatdesk_transport::{ChatTransport, PageRequest, PushFeeds, TransportError};
use chatdesk_types::{Message, MessageEdge, MessagePage, PageInfo, PushEvent, PushKind, Sender};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::send::SendAttempt;

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub page_size: usize,
    /// Flat delay before a reconnect probe; never exponential.
    pub reconnect_delay: Duration,
    pub local_sender: Sender,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: 25,
            reconnect_delay: Duration::from_secs(3),
            local_sender: Sender::Admin,
        }
    }
}

/// Requests from the UI side.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Submit { text: String },
    LoadOlder,
    Refresh,
    SetAtBottom(bool),
}

/// Completions of work the session farmed out to other tasks.
#[derive(Debug)]
enum InternalEvent {
    SendSettled {
        text: String,
        result: Result<Message, TransportError>,
    },
    ProbeDue,
}

/// Immutable view published to the UI after every commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    /// Messages in store order; timestamps never reorder this list.
    pub messages: Vec<Message>,
    pub loading: bool,
    pub has_more: bool,
    /// Send attempts still waiting for their acknowledgment.
    pub pending_sends: usize,
    /// Remote messages that arrived while scrolled away from the bottom.
    pub new_while_away: u32,
    pub connection_lost: bool,
    pub at_bottom: bool,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            loading: false,
            has_more: false,
            pending_sends: 0,
            new_while_away: 0,
            connection_lost: false,
            at_bottom: true,
        }
    }
}

/// Cloneable UI-facing handle. Dropping every clone does not stop the
/// session; call `shutdown` for that.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<ChatSnapshot>,
    cancel: CancellationToken,
}

impl ChatHandle {
    /// Submit a message. Blank input is rejected here and never reaches the
    /// session; returns false for rejected input or a stopped session.
    pub async fn submit(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.commands
            .send(SessionCommand::Submit {
                text: trimmed.to_string(),
            })
            .await
            .is_ok()
    }

    /// Extend the window past the current end cursor.
    pub async fn load_older(&self) -> bool {
        self.commands.send(SessionCommand::LoadOlder).await.is_ok()
    }

    /// Force a re-fetch of the current window.
    pub async fn refresh(&self) -> bool {
        self.commands.send(SessionCommand::Refresh).await.is_ok()
    }

    /// Tell the session where the viewport is. Returning to the bottom
    /// resets the new-message counter.
    pub async fn set_at_bottom(&self, at_bottom: bool) -> bool {
        self.commands
            .send(SessionCommand::SetAtBottom(at_bottom))
            .await
            .is_ok()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch stream of snapshots for reactive consumers.
    pub fn snapshots(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The session task. Single logical writer: every mutation of the store
/// happens on this task, one event at a time.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    store: Arc<MessageStore>,
    options: SessionOptions,
    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    feeds: PushFeeds,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    cancel: CancellationToken,

    pending_sends: Vec<SendAttempt>,
    loading: bool,
    at_bottom: bool,
    new_while_away: u32,
    connection_lost: bool,
    probe_scheduled: bool,
}

impl ChatSession {
    /// Wire a session to a transport and start it. The store handle is
    /// injected so callers (and tests) can read the committed state
    /// directly.
    pub fn spawn(
        transport: Arc<dyn ChatTransport>,
        store: Arc<MessageStore>,
        options: SessionOptions,
    ) -> (ChatHandle, JoinHandle<()>) {
        let feeds = transport.subscribe();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::default());
        let cancel = CancellationToken::new();

        let session = Self {
            transport,
            store,
            options,
            commands: command_rx,
            internal_tx,
            internal_rx,
            feeds,
            snapshot_tx,
            cancel: cancel.clone(),
            pending_sends: Vec::new(),
            loading: false,
            at_bottom: true,
            new_while_away: 0,
            connection_lost: false,
            probe_scheduled: false,
        };
        let handle = ChatHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            cancel,
        };
        let join = tokio::spawn(session.run());
        (handle, join)
    }

    async fn run(mut self) {
        info!("chat session started");
        self.reload_window().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event).await,
                Some(payload) = self.feeds.created.recv() => {
                    self.handle_push(PushEvent::created(payload));
                }
                Some(payload) = self.feeds.updated.recv() => {
                    self.handle_push(PushEvent::updated(payload));
                }
            }
        }
        debug!("chat session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Submit { text } => self.handle_submit(&text),
            SessionCommand::LoadOlder => self.handle_load_older().await,
            SessionCommand::Refresh => self.reload_window().await,
            SessionCommand::SetAtBottom(at_bottom) => {
                self.at_bottom = at_bottom;
                if at_bottom {
                    self.new_while_away = 0;
                }
                self.publish();
            }
        }
    }

    async fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::SendSettled { text, result } => self.handle_send_settled(text, result),
            InternalEvent::ProbeDue => {
                self.probe_scheduled = false;
                self.reload_window().await;
            }
        }
    }

    /// Optimistic submit: placeholder first, wire second. The acknowledgment
    /// re-enters the loop as an event from the spawned task, so concurrent
    /// sends stay independent.
    fn handle_submit(&mut self, input: &str) {
        let Some(attempt) = SendAttempt::begin(input, self.options.local_sender) else {
            debug!("ignoring blank submit");
            return;
        };
        let placeholder = attempt.record().clone();
        let applied = self
            .store
            .update(|page| upsert_by_freshness(page, placeholder.clone()));
        if applied.is_none() {
            // Submit raced ahead of the first page load; open a window
            // holding only the placeholder. The load replaces it and the
            // placeholder is restored on top.
            self.store.replace(MessagePage::new(
                vec![MessageEdge::synthesized(placeholder)],
                PageInfo::default(),
            ));
        }

        let text = attempt.text().to_string();
        self.pending_sends.push(attempt);

        let transport = Arc::clone(&self.transport);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.send_message(&text).await;
            // The session may be gone; a settled send with nobody to tell
            // is not an error.
            let _ = internal.send(InternalEvent::SendSettled { text, result });
        });
        self.publish();
    }

    fn handle_send_settled(&mut self, text: String, result: Result<Message, TransportError>) {
        let position = self
            .pending_sends
            .iter()
            .position(|attempt| attempt.is_inflight() && attempt.text() == text);

        match result {
            Ok(confirmed) => {
                info!(id = %confirmed.id, "send confirmed");
                self.store
                    .update(|page| apply_confirmed(page, &text, confirmed));
                if let Some(position) = position {
                    self.pending_sends[position].settle_confirmed();
                }
                self.prune_confirmed();
                self.connection_lost = false;
            }
            Err(error) => {
                warn!(%error, text = %text, "send failed; keeping placeholder as Failed");
                if let Some(position) = position {
                    self.pending_sends[position].settle_failed();
                    let failed = self.pending_sends[position].record().clone();
                    self.store.update(|page| {
                        // The placeholder may already be gone if a push
                        // confirmed this text first; never resurrect it.
                        if page.contains(&failed.id) {
                            upsert_by_freshness(page, failed);
                        }
                    });
                }
                self.connection_lost = true;
                self.schedule_probe();
            }
        }
        self.publish();
    }

    /// One push event from either stream. Malformed payloads and pushes
    /// racing ahead of the first load are dropped here; neither stops the
    /// dispatcher.
    fn handle_push(&mut self, event: PushEvent) {
        let Some(message) = event.message() else {
            debug!(kind = ?event.kind, "ignoring malformed push payload");
            return;
        };
        if !self.store.is_loaded() {
            warn!(id = %message.id, "push arrived before the first page; dropped");
            return;
        }

        // A created push can be the first arrival of one of our own sends;
        // then it must evict the placeholder exactly like the ack would.
        let confirms = if !message.is_temp() && message.sender == self.options.local_sender {
            self.pending_sends
                .iter()
                .position(|attempt| attempt.awaits_confirmation() && attempt.text() == message.text)
        } else {
            None
        };

        let kind = event.kind;
        let remote = message.sender != self.options.local_sender;
        let outcome = match confirms {
            Some(position) => {
                let text = message.text.clone();
                let outcome = self
                    .store
                    .update(|page| apply_confirmed(page, &text, message));
                self.pending_sends[position].settle_confirmed();
                self.prune_confirmed();
                outcome
            }
            None => self.store.update(|page| upsert_by_freshness(page, message)),
        };

        if kind == PushKind::Created
            && remote
            && !self.at_bottom
            && outcome == Some(UpsertOutcome::Inserted)
        {
            self.new_while_away += 1;
        }
        self.publish();
    }

    async fn handle_load_older(&mut self) {
        let Some(page) = self.store.page() else {
            return;
        };
        if !page.page_info.has_next_page {
            return;
        }
        let Some(cursor) = page.page_info.end_cursor else {
            return;
        };

        self.loading = true;
        self.publish();
        match self
            .transport
            .fetch_page(PageRequest::after(self.options.page_size, cursor))
            .await
        {
            Ok(incoming) => {
                self.store.merge(incoming, MergeDirection::Forward);
                self.connection_lost = false;
            }
            Err(error) => {
                warn!(%error, "load-older failed");
                self.connection_lost = true;
                self.schedule_probe();
            }
        }
        self.loading = false;
        self.publish();
    }

    /// Fetch the current window from scratch and replace the cache with it.
    /// Used for the initial load, explicit refresh, and reconnect probes.
    async fn reload_window(&mut self) {
        self.loading = true;
        self.publish();

        let count = self
            .store
            .page()
            .map(|page| page.len())
            .filter(|len| *len > 0)
            .unwrap_or(self.options.page_size);
        match self.transport.fetch_page(PageRequest::first(count)).await {
            Ok(incoming) => {
                self.store.merge(incoming, MergeDirection::Initial);
                self.restore_placeholders();
                if self.connection_lost {
                    info!("reconnected");
                }
                self.connection_lost = false;
            }
            Err(error) => {
                warn!(%error, "window reload failed");
                self.connection_lost = true;
                self.schedule_probe();
            }
        }
        self.loading = false;
        self.publish();
    }

    /// Re-seat optimistic records after a full window replacement. Confirmed
    /// attempts are pruned eagerly, so whatever is still tracked belongs on
    /// screen.
    fn restore_placeholders(&self) {
        self.store.update(|page| {
            for attempt in &self.pending_sends {
                if !page.contains(&attempt.record().id) {
                    page.edges
                        .push(MessageEdge::synthesized(attempt.record().clone()));
                }
            }
        });
    }

    fn prune_confirmed(&mut self) {
        self.pending_sends
            .retain(|attempt| !attempt.is_confirmed());
    }

    /// One probe at a time, always at the same flat delay.
    fn schedule_probe(&mut self) {
        if self.probe_scheduled {
            return;
        }
        self.probe_scheduled = true;
        let delay = self.options.reconnect_delay;
        let internal = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = internal.send(InternalEvent::ProbeDue);
                }
            }
        });
    }

    fn publish(&self) {
        let page = self.store.page();
        let snapshot = ChatSnapshot {
            messages: page
                .as_ref()
                .map(|page| page.messages().cloned().collect())
                .unwrap_or_default(),
            loading: self.loading,
            has_more: page
                .as_ref()
                .map(|page| page.page_info.has_next_page)
                .unwrap_or(false),
            pending_sends: self
                .pending_sends
                .iter()
                .filter(|attempt| attempt.is_inflight())
                .count(),
            new_while_away: self.new_while_away,
            connection_lost: self.connection_lost,
            at_bottom: self.at_bottom,
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}
