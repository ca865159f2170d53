//! Integration tests driving a full session against the fixture backend.

use std::sync::Arc;
use std::time::Duration;

use chatdesk_cache::MessageStore;
use chatdesk_client::{ChatHandle, ChatSession, ChatSnapshot, SessionOptions};
use chatdesk_transport::{ChatTransport, FixtureBackend};
use chatdesk_types::{Message, MessageStatus, Sender};
use chrono::{TimeZone, Utc};

fn seeded_backend(count: i64) -> Arc<FixtureBackend> {
    let backend = Arc::new(FixtureBackend::new());
    backend.seed(
        (1..=count)
            .map(|i| {
                Message::new(
                    i.to_string(),
                    format!("history {}", i),
                    MessageStatus::Read,
                    Utc.timestamp_opt(1_000 + i, 0).unwrap(),
                    if i % 2 == 0 {
                        Sender::Admin
                    } else {
                        Sender::Customer
                    },
                )
            })
            .collect(),
    );
    backend
}

fn options(page_size: usize) -> SessionOptions {
    SessionOptions {
        page_size,
        reconnect_delay: Duration::from_millis(300),
        ..SessionOptions::default()
    }
}

fn spawn(
    backend: &Arc<FixtureBackend>,
    options: SessionOptions,
) -> (ChatHandle, Arc<MessageStore>) {
    let store = Arc::new(MessageStore::new());
    let (handle, _join) = ChatSession::spawn(
        backend.clone() as Arc<dyn ChatTransport>,
        store.clone(),
        options,
    );
    (handle, store)
}

/// Wait until a published snapshot satisfies the predicate.
async fn wait_for<F>(handle: &ChatHandle, mut predicate: F) -> ChatSnapshot
where
    F: FnMut(&ChatSnapshot) -> bool,
{
    let mut snapshots = handle.snapshots();
    tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            let current = snapshots.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            snapshots.changed().await.expect("session ended early");
        }
    })
    .await
    .expect("snapshot condition not reached in time")
}

#[tokio::test]
async fn test_initial_load_fills_the_window() {
    let backend = seeded_backend(5);
    let (handle, _store) = spawn(&backend, options(3));

    let snapshot = wait_for(&handle, |s| !s.loading && s.messages.len() == 3).await;
    assert!(snapshot.has_more);
    let ids: Vec<&str> = snapshot.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3"]);
}

#[tokio::test]
async fn test_load_older_extends_the_window() {
    let backend = seeded_backend(5);
    let (handle, _store) = spawn(&backend, options(3));
    wait_for(&handle, |s| s.messages.len() == 3).await;

    assert!(handle.load_older().await);
    let snapshot = wait_for(&handle, |s| !s.loading && s.messages.len() == 5).await;
    assert!(!snapshot.has_more);
    let ids: Vec<&str> = snapshot.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_submit_confirms_and_collapses_placeholder() {
    let backend = seeded_backend(2);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 2).await;

    assert!(handle.submit("  on my way  ").await);
    let snapshot = wait_for(&handle, |s| {
        s.pending_sends == 0 && s.messages.iter().any(|m| m.text == "on my way" && !m.is_temp())
    })
    .await;

    let with_text: Vec<&Message> = snapshot
        .messages
        .iter()
        .filter(|m| m.text == "on my way")
        .collect();
    assert_eq!(with_text.len(), 1);
    assert_eq!(with_text[0].id, "3");
    assert_eq!(with_text[0].status, MessageStatus::Sent);
    assert!(snapshot.messages.iter().all(|m| !m.is_temp()));
}

#[tokio::test]
async fn test_placeholder_shows_while_ack_is_in_flight() {
    let backend = seeded_backend(1);
    backend.set_send_delay(Duration::from_millis(300));
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    handle.submit("hello").await;
    let snapshot = wait_for(&handle, |s| s.pending_sends == 1).await;
    let placeholder = snapshot
        .messages
        .iter()
        .find(|m| m.text == "hello")
        .expect("placeholder visible");
    assert!(placeholder.is_temp());
    assert_eq!(placeholder.status, MessageStatus::Sending);

    let snapshot = wait_for(&handle, |s| s.pending_sends == 0).await;
    assert!(snapshot.messages.iter().all(|m| !m.is_temp()));
}

#[tokio::test]
async fn test_blank_submit_is_rejected() {
    let backend = seeded_backend(1);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    assert!(!handle.submit("   \n").await);
    assert_eq!(handle.snapshot().pending_sends, 0);
    assert_eq!(handle.snapshot().messages.len(), 1);
}

#[tokio::test]
async fn test_push_beating_the_ack_still_converges() {
    let backend = Arc::new(FixtureBackend::manual_push());
    backend.set_send_delay(Duration::from_millis(300));
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| !s.loading).await;

    handle.submit("hi").await;
    wait_for(&handle, |s| s.pending_sends == 1).await;

    // The push stream reports the creation before the ack returns.
    let confirm = Message::new("1", "hi", MessageStatus::Sent, Utc::now(), Sender::Admin);
    backend.push_created(serde_json::to_value(&confirm).unwrap());

    let snapshot = wait_for(&handle, |s| s.messages.iter().any(|m| m.id == "1")).await;
    assert!(snapshot.messages.iter().all(|m| !m.is_temp()));

    // The late ack must land as a no-op.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.pending_sends, 0);
    let with_text: Vec<&Message> = snapshot.messages.iter().filter(|m| m.text == "hi").collect();
    assert_eq!(with_text.len(), 1);
    assert_eq!(with_text[0].id, "1");
}

#[tokio::test]
async fn test_stale_push_is_suppressed() {
    let backend = seeded_backend(3);
    let (handle, store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 3).await;

    let stale = Message::new(
        "2",
        "rewritten",
        MessageStatus::Sending,
        Utc.timestamp_opt(500, 0).unwrap(),
        Sender::Admin,
    );
    backend.push_updated(serde_json::to_value(&stale).unwrap());

    // A marker on the same stream proves the stale event was processed.
    let marker = Message::new(
        "99",
        "marker",
        MessageStatus::Sent,
        Utc::now(),
        Sender::Customer,
    );
    backend.push_updated(serde_json::to_value(&marker).unwrap());
    wait_for(&handle, |s| s.messages.iter().any(|m| m.id == "99")).await;

    let page = store.page().unwrap();
    let kept = page.messages().find(|m| m.id == "2").unwrap();
    assert_eq!(kept.text, "history 2");
    assert_eq!(kept.status, MessageStatus::Read);
    assert_eq!(kept.updated_at, Utc.timestamp_opt(1_002, 0).unwrap());
}

#[tokio::test]
async fn test_updated_push_advances_status() {
    let backend = seeded_backend(1);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    handle.submit("read me").await;
    wait_for(&handle, |s| {
        s.messages.iter().any(|m| m.text == "read me" && !m.is_temp())
    })
    .await;

    backend.mark_read("2").unwrap();
    let snapshot = wait_for(&handle, |s| {
        s.messages
            .iter()
            .any(|m| m.id == "2" && m.status == MessageStatus::Read)
    })
    .await;
    assert_eq!(snapshot.messages.len(), 2);
}

#[tokio::test]
async fn test_malformed_pushes_are_ignored() {
    let backend = seeded_backend(1);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    backend.push_created(serde_json::Value::Null);
    backend.push_created(serde_json::json!({ "id": 17, "weird": [] }));
    backend.push_updated(serde_json::json!("not even an object"));

    // The dispatcher keeps going: a real event after the garbage still lands.
    let real = backend.customer_says("still alive");
    let snapshot = wait_for(&handle, |s| s.messages.iter().any(|m| m.id == real.id)).await;
    assert_eq!(snapshot.messages.len(), 2);
}

#[tokio::test]
async fn test_new_message_counter_tracks_remote_arrivals() {
    let backend = seeded_backend(1);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    handle.set_at_bottom(false).await;
    wait_for(&handle, |s| !s.at_bottom).await;

    backend.customer_says("one");
    wait_for(&handle, |s| s.new_while_away == 1).await;

    // Our own confirmed send echoes a created push; it must not count.
    handle.submit("me too").await;
    wait_for(&handle, |s| {
        s.pending_sends == 0 && s.messages.iter().any(|m| m.text == "me too" && !m.is_temp())
    })
    .await;
    assert_eq!(handle.snapshot().new_while_away, 1);

    backend.customer_says("two");
    wait_for(&handle, |s| s.new_while_away == 2).await;

    handle.set_at_bottom(true).await;
    let snapshot = wait_for(&handle, |s| s.at_bottom).await;
    assert_eq!(snapshot.new_while_away, 0);
}

#[tokio::test]
async fn test_failed_send_keeps_placeholder_and_reconnects() {
    let backend = seeded_backend(1);
    backend.set_fail_sends(true);
    let (handle, _store) = spawn(&backend, options(10));
    wait_for(&handle, |s| s.messages.len() == 1).await;

    handle.submit("did this go through?").await;
    let snapshot = wait_for(&handle, |s| s.connection_lost).await;
    let ghost = snapshot
        .messages
        .iter()
        .find(|m| m.text == "did this go through?")
        .expect("placeholder kept");
    assert!(ghost.is_temp());
    assert_eq!(ghost.status, MessageStatus::Failed);

    // The probe fires at its flat delay; the ghost survives the window
    // reload that comes with reconnecting.
    let snapshot = wait_for(&handle, |s| !s.connection_lost).await;
    let ghost = snapshot
        .messages
        .iter()
        .find(|m| m.text == "did this go through?")
        .expect("ghost survived reload");
    assert!(ghost.is_temp());
    assert_eq!(ghost.status, MessageStatus::Failed);
}

#[tokio::test]
async fn test_failed_page_fetch_probes_and_recovers() {
    let backend = seeded_backend(6);
    let (handle, _store) = spawn(&backend, options(3));
    wait_for(&handle, |s| s.messages.len() == 3).await;

    backend.set_fail_fetches(true);
    handle.load_older().await;
    wait_for(&handle, |s| s.connection_lost).await;

    backend.set_fail_fetches(false);
    // The probe refetches the current window.
    let snapshot = wait_for(&handle, |s| !s.connection_lost && !s.loading).await;
    assert_eq!(snapshot.messages.len(), 3);
    assert!(snapshot.has_more);
}

#[tokio::test]
async fn test_shutdown_stops_the_session() {
    let backend = seeded_backend(1);
    let store = Arc::new(MessageStore::new());
    let (handle, join) = ChatSession::spawn(
        backend.clone() as Arc<dyn ChatTransport>,
        store,
        options(10),
    );
    wait_for(&handle, |s| s.messages.len() == 1).await;

    handle.shutdown();
    join.await.unwrap();

    // Events after teardown go nowhere, harmlessly.
    backend.customer_says("anyone?");
    assert!(!handle.submit("too late").await);
}
