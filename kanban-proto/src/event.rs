//! Realtime push events delivered on the broker topic.
//!
//! Wire shape: `{"type": "CREATED" | "PATCHED" | "DELETED", "payload": ...}`
//! where the payload is a full task, a partial task, or `{ "id": n }`.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId, TaskPatch};

/// Reference to a task by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
}

/// A change pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEvent {
    /// A task was created.
    Created(Task),
    /// Some fields of a task changed.
    Patched(TaskPatch),
    /// A task was removed.
    Deleted(TaskRef),
}

impl TaskEvent {
    /// The task this event is about.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::Created(task) => task.id,
            Self::Patched(patch) => patch.id,
            Self::Deleted(r) => r.id,
        }
    }

    /// Wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "CREATED",
            Self::Patched(_) => "PATCHED",
            Self::Deleted(_) => "DELETED",
        }
    }

    /// Shorthand for a `DELETED` event.
    #[must_use]
    pub const fn deleted(id: TaskId) -> Self {
        Self::Deleted(TaskRef { id })
    }
}

/// A push payload that could not be understood.
#[derive(Debug, thiserror::Error)]
#[error("malformed push payload: {0}")]
pub struct EventError(#[from] serde_json::Error);

/// Decodes one JSON push payload.
///
/// # Errors
///
/// Returns [`EventError`] for invalid JSON, an unknown `type`, or a payload
/// that does not match the event kind.
pub fn decode(text: &str) -> Result<TaskEvent, EventError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes an event to its JSON wire form.
///
/// # Errors
///
/// Returns [`EventError`] if serialization fails.
pub fn encode(event: &TaskEvent) -> Result<String, EventError> {
    Ok(serde_json::to_string(event)?)
}
