// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for the realtime bridge.
//!
//! Runs [`RealtimeBridge`] against the in-process STOMP broker and checks
//! the handshake, event delivery, malformed-payload handling, the
//! connect/disconnect guards and reconnection.

mod support;

use std::sync::Arc;
use std::time::Duration;

use kanban::realtime::{RealtimeBridge, RealtimeConfig};
use kanban_proto::event::TaskEvent;
use kanban_proto::stomp::{Command, Frame, HeartBeat};
use kanban_proto::task::{Priority, Task, TaskId, TaskPatch, TaskStatus};
use parking_lot::Mutex;
use support::{MockBroker, TOKEN, wait_until};

const TOPIC: &str = "/topic/task-updates";
const WAIT: Duration = Duration::from_secs(5);

fn config(broker: &MockBroker) -> RealtimeConfig {
    let mut config = RealtimeConfig::new(broker.url(), TOPIC);
    config.reconnect_delay = Duration::from_millis(100);
    config.connect_timeout = Duration::from_secs(2);
    config.heartbeat = HeartBeat::default();
    config.token = Some(TOKEN.to_string());
    config
}

type Seen = Arc<Mutex<Vec<TaskEvent>>>;

fn collector() -> (Seen, impl Fn(TaskEvent) + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event| sink.lock().push(event))
}

fn task(id: i64) -> Task {
    Task {
        id: TaskId::new(id),
        title: format!("task {id}"),
        description: None,
        status: TaskStatus::ToDo,
        priority: Priority::Low,
        version: 0,
        links: Default::default(),
    }
}

#[tokio::test]
async fn handshake_sends_connect_and_subscribe() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    let (_seen, handler) = collector();

    assert!(bridge.connect(handler));
    assert!(broker.wait_for_subscriptions(1).await);
    assert!(wait_until(WAIT, || bridge.is_connected()).await);

    let frames = broker.received();
    let connect = &frames[0];
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.get("accept-version"), Some("1.2"));
    assert_eq!(connect.get("host"), Some("127.0.0.1"));
    assert_eq!(connect.get("Authorization"), Some("Bearer test-token"));

    let subscribe = &frames[1];
    assert_eq!(subscribe.command, Command::Subscribe);
    assert_eq!(subscribe.get("destination"), Some(TOPIC));
    assert!(subscribe.get("id").unwrap().starts_with("sub-"));

    bridge.disconnect().await;
}

#[tokio::test]
async fn delivers_events_in_order() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    let (seen, handler) = collector();
    bridge.connect(handler);
    assert!(broker.wait_for_subscriptions(1).await);

    let patch = TaskPatch {
        id: TaskId::new(1),
        status: Some(TaskStatus::Done),
        version: Some(1),
        ..TaskPatch::default()
    };
    let events = vec![
        TaskEvent::Created(task(1)),
        TaskEvent::Patched(patch),
        TaskEvent::deleted(TaskId::new(1)),
    ];
    for event in &events {
        broker.publish(event);
    }

    assert!(wait_until(WAIT, || seen.lock().len() == 3).await);
    assert_eq!(*seen.lock(), events);
    bridge.disconnect().await;
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_subscription_survives() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    let (seen, handler) = collector();
    bridge.connect(handler);
    assert!(broker.wait_for_subscriptions(1).await);

    broker.publish_body("{definitely not json");
    broker.publish_body(r#"{"type":"RENAMED","payload":{"id":1}}"#);
    broker.send_raw("NOT A FRAME");
    broker.publish(&TaskEvent::deleted(TaskId::new(2)));

    assert!(wait_until(WAIT, || seen.lock().len() == 1).await);
    assert_eq!(seen.lock()[0], TaskEvent::deleted(TaskId::new(2)));
    assert_eq!(broker.connections(), 1);
    assert!(bridge.is_connected());
    bridge.disconnect().await;
}

#[tokio::test]
async fn repeated_connect_keeps_one_session() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    let (seen, handler) = collector();
    let (_, other) = collector();

    assert!(bridge.connect(handler));
    assert!(!bridge.connect(other));
    assert!(!bridge.clone().connect(|_| {}));
    assert!(broker.wait_for_subscriptions(1).await);

    broker.publish(&TaskEvent::deleted(TaskId::new(5)));
    assert!(wait_until(WAIT, || seen.lock().len() == 1).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.connections(), 1);
    assert_eq!(broker.subscriptions(), 1);
    bridge.disconnect().await;
}

#[tokio::test]
async fn disconnect_is_graceful_and_idempotent() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    bridge.connect(|_| {});
    assert!(broker.wait_for_subscriptions(1).await);

    assert!(bridge.disconnect().await);
    assert!(wait_until(WAIT, || broker.disconnects() == 1).await);
    assert!(!bridge.is_active());
    assert!(!bridge.is_connected());
    assert!(!bridge.disconnect().await);

    // No reconnect after an explicit disconnect.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(broker.connections(), 1);
}

#[tokio::test]
async fn disconnect_while_unreachable_stops_retrying() {
    let mut config = RealtimeConfig::new("ws://127.0.0.1:1/ws", TOPIC);
    config.reconnect_delay = Duration::from_millis(50);
    config.connect_timeout = Duration::from_millis(200);
    let bridge = RealtimeBridge::new(config);

    bridge.connect(|_| {});
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(bridge.is_active());
    assert!(!bridge.is_connected());
    assert!(bridge.disconnect().await);
    assert!(!bridge.is_active());
}

#[tokio::test]
async fn reconnects_after_broker_drops_connection() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    let (seen, handler) = collector();
    bridge.connect(handler);
    assert!(broker.wait_for_subscriptions(1).await);

    broker.drop_connections();
    assert!(broker.wait_for_subscriptions(2).await);
    assert_eq!(broker.connections(), 2);

    broker.publish(&TaskEvent::Created(task(9)));
    assert!(wait_until(WAIT, || seen.lock().len() == 1).await);
    bridge.disconnect().await;
}

#[tokio::test]
async fn error_frame_triggers_reconnect() {
    let broker = MockBroker::start().await;
    let bridge = RealtimeBridge::new(config(&broker));
    bridge.connect(|_| {});
    assert!(broker.wait_for_subscriptions(1).await);

    let error = Frame::new(Command::Error)
        .header("message", "session expired")
        .encode();
    broker.send_raw(&error);
    assert!(broker.wait_for_subscriptions(2).await);
    bridge.disconnect().await;
}

#[tokio::test]
async fn sends_heartbeats_when_broker_asks() {
    let broker = MockBroker::start_with_heartbeat("0,50").await;
    let mut config = config(&broker);
    config.heartbeat = HeartBeat::new(50, 0);
    let bridge = RealtimeBridge::new(config);
    bridge.connect(|_| {});
    assert!(broker.wait_for_subscriptions(1).await);

    assert!(wait_until(WAIT, || broker.heartbeats() >= 3).await);
    bridge.disconnect().await;
}

#[tokio::test]
async fn silent_broker_is_detected_by_heartbeat_watchdog() {
    // Broker promises heart-beats every 50ms but never sends any.
    let broker = MockBroker::start_with_heartbeat("50,0").await;
    let mut config = config(&broker);
    config.heartbeat = HeartBeat::new(0, 50);
    let bridge = RealtimeBridge::new(config);
    bridge.connect(|_| {});

    assert!(broker.wait_for_subscriptions(2).await);
    assert!(broker.connections() >= 2);
    bridge.disconnect().await;
}
