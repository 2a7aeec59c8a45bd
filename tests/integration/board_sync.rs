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

//! End-to-end board synchronization tests.
//!
//! A [`Board`] over the REST store, optionally fed by the realtime bridge,
//! against the in-process mock API and broker.

mod support;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use kanban::board::{Board, BoardError, MoveOutcome};
use kanban::realtime::{RealtimeBridge, RealtimeConfig};
use kanban::store::{HttpTaskStore, StoreError, TaskStore};
use kanban_proto::event::TaskEvent;
use kanban_proto::stomp::HeartBeat;
use kanban_proto::task::{Priority, TaskDraft, TaskId, TaskPatch, TaskStatus};
use serde_json::json;
use support::{MockApi, MockBroker, TOKEN, wait_until};

const WAIT: Duration = Duration::from_secs(5);

fn board(api: &MockApi) -> Board<HttpTaskStore> {
    let store = HttpTaskStore::new(api.base_url(), TOKEN, Duration::from_secs(5)).unwrap();
    Board::new(store)
}

fn live_board(api: &MockApi, broker: &MockBroker) -> Board<HttpTaskStore> {
    let mut config = RealtimeConfig::new(broker.url(), "/topic/task-updates");
    config.reconnect_delay = Duration::from_millis(100);
    config.heartbeat = HeartBeat::default();
    board(api).with_realtime(RealtimeBridge::new(config))
}

#[tokio::test]
async fn drag_to_in_progress_sends_one_versioned_patch() {
    let api = MockApi::start().await;
    let seeded = api.seed("ship it", TaskStatus::ToDo).await;
    assert_eq!(seeded.id, TaskId::new(1));
    assert_eq!(seeded.version, 0);

    let board = board(&api);
    board.load().await.unwrap();
    api.clear_requests();

    let outcome = board
        .move_task(seeded.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert!(matches!(outcome, MoveOutcome::Moved(_)));

    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].path, "/api/tasks/1");
    assert_eq!(
        requests[0].body.as_ref().unwrap(),
        &json!({"status": "IN_PROGRESS", "version": 0})
    );

    let local = board.task(seeded.id).unwrap();
    assert_eq!(local.status, TaskStatus::InProgress);
    assert_eq!(local.version, 1);
    assert_eq!(board.column(TaskStatus::InProgress).len(), 1);
    assert!(board.column(TaskStatus::ToDo).is_empty());
}

#[tokio::test]
async fn drop_onto_own_column_makes_no_request() {
    let api = MockApi::start().await;
    let seeded = api.seed("stay", TaskStatus::Done).await;
    let board = board(&api);
    board.load().await.unwrap();
    api.clear_requests();
    let before = board.snapshot();

    let outcome = board.move_task(seeded.id, TaskStatus::Done).await.unwrap();
    assert_eq!(outcome, MoveOutcome::Unchanged);
    assert!(api.requests().is_empty());
    assert_eq!(board.snapshot(), before);
}

#[tokio::test]
async fn version_conflict_resyncs_board() {
    let api = MockApi::start().await;
    let seeded = api.seed("contested", TaskStatus::ToDo).await;
    let board = board(&api);
    board.load().await.unwrap();

    // Another client moves the task first.
    api.store()
        .patch_status(seeded.id, TaskStatus::Done, Some(0))
        .await
        .unwrap();
    api.clear_requests();

    let err = board
        .move_task(seeded.id, TaskStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Store(StoreError::Conflict { .. })));
    assert!(err.is_recoverable());

    let methods: Vec<_> = api.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::PATCH, Method::GET]);

    let local = board.task(seeded.id).unwrap();
    assert_eq!(local.status, TaskStatus::Done);
    assert_eq!(local.version, 1);
}

#[tokio::test]
async fn not_found_on_move_removes_stale_task() {
    let api = MockApi::start().await;
    let gone = api.seed("gone", TaskStatus::ToDo).await;
    let kept = api.seed("kept", TaskStatus::ToDo).await;
    let board = board(&api);
    board.load().await.unwrap();

    api.store().remove(gone.id).await.unwrap();
    let err = board.move_task(gone.id, TaskStatus::Done).await.unwrap_err();
    assert_eq!(err, BoardError::Store(StoreError::NotFound(gone.id)));

    let ids: Vec<_> = board.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![kept.id]);
}

#[tokio::test]
async fn create_with_empty_title_is_rejected_locally() {
    let api = MockApi::start().await;
    let board = board(&api);
    board.load().await.unwrap();
    api.clear_requests();

    let draft = TaskDraft::new("")
        .with_status(TaskStatus::ToDo)
        .with_priority(Priority::Low);
    let err = board.create(&draft).await.unwrap_err();
    let BoardError::Store(store_err) = err else {
        panic!("expected a store error");
    };
    assert!(store_err.field_errors().unwrap().contains_key("title"));
    assert!(board.tasks().is_empty());
    assert!(api.requests().is_empty());
}

#[tokio::test]
async fn create_update_delete_round_trip() {
    let api = MockApi::start().await;
    let board = board(&api);
    board.load().await.unwrap();

    let created = board
        .create(
            &TaskDraft::new("draft")
                .with_status(TaskStatus::ToDo)
                .with_priority(Priority::Med),
        )
        .await
        .unwrap();
    assert_eq!(board.tasks().len(), 1);

    let mut edit = created.to_draft();
    edit.title = "final".into();
    let updated = board.update(created.id, &edit).await.unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(board.task(created.id).unwrap().title, "final");

    board.delete(created.id).await.unwrap();
    assert!(board.tasks().is_empty());
    assert!(api.store().snapshot().is_empty());
}

#[tokio::test]
async fn load_failure_clears_board_and_records_error() {
    let api = MockApi::start().await;
    api.seed("a", TaskStatus::ToDo).await;
    let board = board(&api);
    board.load().await.unwrap();
    assert_eq!(board.tasks().len(), 1);

    api.fail_next(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "db down"}));
    let err = board.load().await.unwrap_err();
    assert!(!err.is_recoverable());

    let state = board.snapshot();
    assert!(state.tasks().is_empty());
    assert!(!state.is_loading());
    assert_eq!(
        state.error(),
        Some("The task service failed (500): db down")
    );
}

#[tokio::test]
async fn pushed_events_reach_the_board_idempotently() {
    let api = MockApi::start().await;
    let broker = MockBroker::start().await;
    let board = live_board(&api, &broker);
    board.load().await.unwrap();
    assert!(board.connect_realtime());
    assert!(broker.wait_for_subscriptions(1).await);

    let remote = api.seed("from elsewhere", TaskStatus::ToDo).await;
    broker.publish(&TaskEvent::Created(remote.clone()));
    broker.publish(&TaskEvent::Created(remote.clone()));
    broker.publish(&TaskEvent::Patched(TaskPatch {
        id: remote.id,
        priority: Some(Priority::High),
        version: Some(1),
        ..TaskPatch::default()
    }));

    assert!(wait_until(WAIT, || board.task(remote.id).is_some_and(|t| t.version == 1)).await);
    assert_eq!(board.tasks().len(), 1);
    assert_eq!(board.task(remote.id).unwrap().priority, Priority::High);

    broker.publish(&TaskEvent::deleted(remote.id));
    broker.publish(&TaskEvent::deleted(remote.id));
    assert!(wait_until(WAIT, || board.tasks().is_empty()).await);

    board.shutdown().await;
}

#[tokio::test]
async fn echo_of_own_move_does_not_duplicate() {
    let api = MockApi::start().await;
    let broker = MockBroker::start().await;
    let seeded = api.seed("echo", TaskStatus::ToDo).await;
    let board = live_board(&api, &broker);
    board.load().await.unwrap();
    board.connect_realtime();
    assert!(broker.wait_for_subscriptions(1).await);

    let MoveOutcome::Moved(moved) = board.move_task(seeded.id, TaskStatus::Done).await.unwrap()
    else {
        panic!("expected a move");
    };
    broker.publish(&TaskEvent::Patched(moved.clone().into()));
    // A late, stale echo of the pre-move state must not roll the task back.
    broker.publish(&TaskEvent::Patched(seeded.clone().into()));
    broker.publish(&TaskEvent::Created(moved.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(board.tasks(), vec![moved]);
    board.shutdown().await;
}

#[tokio::test]
async fn remote_delete_during_edit_makes_response_a_noop() {
    let api = MockApi::start().await;
    let broker = MockBroker::start().await;
    let seeded = api.seed("being edited", TaskStatus::ToDo).await;
    let board = live_board(&api, &broker);
    board.load().await.unwrap();
    board.connect_realtime();
    assert!(broker.wait_for_subscriptions(1).await);

    let mut edit = board.task(seeded.id).unwrap().to_draft();
    edit.title = "edited".into();

    broker.publish(&TaskEvent::deleted(seeded.id));
    assert!(wait_until(WAIT, || board.tasks().is_empty()).await);

    // The server still had the task, so the edit succeeds there.
    let updated = board.update(seeded.id, &edit).await.unwrap();
    assert_eq!(updated.title, "edited");
    assert!(board.tasks().is_empty());
    board.shutdown().await;
}

#[tokio::test]
async fn shutdown_disconnects_and_ignores_late_events() {
    let api = MockApi::start().await;
    let broker = MockBroker::start().await;
    let board = live_board(&api, &broker);
    board.load().await.unwrap();
    board.connect_realtime();
    assert!(broker.wait_for_subscriptions(1).await);

    board.shutdown().await;
    assert!(!board.is_active());
    assert!(!board.realtime().unwrap().is_active());
    assert!(wait_until(WAIT, || broker.disconnects() == 1).await);

    let late = api.seed("late", TaskStatus::ToDo).await;
    assert!(!board.apply_event(&TaskEvent::Created(late)));
    assert!(board.tasks().is_empty());
}
