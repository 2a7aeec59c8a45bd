//! Property-based tests for the wire formats.
//!
//! Uses proptest to verify:
//! 1. Arbitrary header values survive STOMP escaping on a MESSAGE frame.
//! 2. Any push event survives an encode → decode round-trip.
//! 3. Arbitrary text never makes `Frame::decode` or `event::decode` panic.
//! 4. Status names parse regardless of case and separator style.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use kanban_proto::event::{self, TaskEvent};
use kanban_proto::stomp::{Command, Frame};
use kanban_proto::task::{Link, Links, Priority, Task, TaskId, TaskPatch, TaskStatus};
use proptest::prelude::*;

// --- Strategies ---

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Med), Just(Priority::High)]
}

fn arb_links() -> impl Strategy<Value = Links> {
    prop::collection::btree_map(
        prop_oneof![Just("self"), Just("update"), Just("patch"), Just("delete")]
            .prop_map(String::from),
        ("[a-z/:.0-9]{1,40}", prop::option::of("(GET|PUT|PATCH|DELETE)"))
            .prop_map(|(href, method)| Link { href, method }),
        0..4,
    )
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        any::<i64>(),
        "[^\x00]{1,64}",
        prop::option::of(".{0,128}"),
        arb_status(),
        arb_priority(),
        any::<u64>(),
        arb_links(),
    )
        .prop_map(
            |(id, title, description, status, priority, version, links)| Task {
                id: TaskId::new(id),
                title,
                description,
                status,
                priority,
                version,
                links,
            },
        )
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        any::<i64>(),
        prop::option::of(".{1,64}"),
        prop::option::of(arb_status()),
        prop::option::of(arb_priority()),
        prop::option::of(any::<u64>()),
    )
        .prop_map(|(id, title, status, priority, version)| TaskPatch {
            id: TaskId::new(id),
            title,
            status,
            priority,
            version,
            ..TaskPatch::default()
        })
}

fn arb_event() -> impl Strategy<Value = TaskEvent> {
    prop_oneof![
        arb_task().prop_map(TaskEvent::Created),
        arb_patch().prop_map(TaskEvent::Patched),
        any::<i64>().prop_map(|id| TaskEvent::deleted(TaskId::new(id))),
    ]
}

/// Header names that carry no framing meaning of their own.
fn arb_header_name() -> impl Strategy<Value = String> {
    "x-[a-z:\\\\]{1,12}"
}

// --- Property tests ---

proptest! {
    /// Colons, backslashes and line breaks in headers are escaped and restored.
    #[test]
    fn message_headers_survive_escaping(
        headers in prop::collection::vec((arb_header_name(), "[^\x00]{0,64}"), 0..6),
        body in "[^\x00]{0,256}",
    ) {
        let mut frame = Frame::new(Command::Message).body(body.clone());
        for (name, value) in &headers {
            frame = frame.header(name.clone(), value.clone());
        }

        let decoded = Frame::decode(&frame.encode())
            .expect("decode should succeed")
            .expect("should not be a heart-beat");
        prop_assert_eq!(decoded.command, Command::Message);
        prop_assert_eq!(&decoded.body, &body);
        let expected: Vec<_> = headers.into_iter().collect();
        let got: Vec<_> = decoded
            .headers()
            .iter()
            .filter(|(name, _)| name != "content-length")
            .cloned()
            .collect();
        prop_assert_eq!(got, expected);
    }

    /// Any push event survives the JSON wire form.
    #[test]
    fn event_round_trip(event in arb_event()) {
        let text = event::encode(&event).expect("encode should succeed");
        let decoded = event::decode(&text).expect("decode should succeed");
        prop_assert_eq!(event, decoded);
    }

    /// Arbitrary text is either a frame, a heart-beat or an error.
    #[test]
    fn frame_decode_never_panics(text in ".{0,512}") {
        let _ = Frame::decode(&text);
    }

    /// Arbitrary text is either an event or an error.
    #[test]
    fn event_decode_never_panics(text in ".{0,512}") {
        let _ = event::decode(&text);
    }

    /// Hyphens, spaces and case do not matter when naming a status.
    #[test]
    fn status_names_are_forgiving(
        status in arb_status(),
        upper in any::<bool>(),
        sep in prop_oneof![Just("_"), Just("-"), Just(" ")],
    ) {
        let wire = match status {
            TaskStatus::ToDo => format!("to{sep}do"),
            TaskStatus::InProgress => format!("in{sep}progress"),
            TaskStatus::Done => "done".to_string(),
        };
        let input = if upper { wire.to_uppercase() } else { wire };
        prop_assert_eq!(input.parse::<TaskStatus>().ok(), Some(status));
    }
}
