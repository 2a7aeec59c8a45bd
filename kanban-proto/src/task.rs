//! Task model and request payloads for the Kanban task API.
//!
//! A [`Task`] is what the server returns; a [`TaskDraft`] is what the
//! client sends on create/update; a [`TaskPatch`] is a partial task used
//! for merge-patch style updates (realtime `PATCHED` events).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Field name → human-readable message, as carried by validation failures.
pub type FieldErrors = BTreeMap<String, String>;

/// Action name → affordance link, as carried in a task's `_links`.
pub type Links = BTreeMap<String, Link>;

/// Server-assigned, immutable task identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Error returned when parsing a status or priority from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not one of `TO_DO`, `IN_PROGRESS`, `DONE`.
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    /// Not one of `LOW`, `MED`, `HIGH`.
    #[error("unknown task priority: {0}")]
    UnknownPriority(String),
}

/// Normalizes user input like `in-progress` or `todo` to wire spelling.
fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

/// The column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started.
    ToDo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// All statuses in board column order.
    pub const ALL: [Self; 3] = [Self::ToDo, Self::InProgress, Self::Done];

    /// Wire spelling (`TO_DO`, `IN_PROGRESS`, `DONE`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "TO_DO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }

    /// Column heading.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "TO_DO" | "TODO" => Ok(Self::ToDo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            _ => Err(ParseError::UnknownStatus(s.to_string())),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority (`MED` on the wire).
    Med,
    /// High priority.
    High,
}

impl Priority {
    /// Wire spelling (`LOW`, `MED`, `HIGH`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Med => "MED",
            Self::High => "HIGH",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Med => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "LOW" => Ok(Self::Low),
            "MED" | "MEDIUM" => Ok(Self::Med),
            "HIGH" => Ok(Self::High),
            _ => Err(ParseError::UnknownPriority(s.to_string())),
        }
    }
}

/// A hypermedia link: where an action goes and which verb it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Target address.
    pub href: String,
    /// Allowed HTTP verb, when the server states one.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Link {
    /// Creates a link with an explicit verb.
    pub fn new(href: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            method: Some(method.into()),
        }
    }
}

/// Operations a server may advertise on a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Canonical address of the task.
    SelfLink,
    /// Create a sibling task.
    Create,
    /// Full replace.
    Update,
    /// Status merge-patch.
    Patch,
    /// Removal.
    Delete,
}

impl Action {
    /// Key under `_links`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::SelfLink => "self",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

/// A task as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: TaskId,
    /// Non-empty title.
    pub title: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Column the task is in.
    pub status: TaskStatus,
    /// Priority.
    pub priority: Priority,
    /// Optimistic-concurrency counter, 0 on creation.
    #[serde(default)]
    pub version: u64,
    /// Advisory affordances; absent means "not available".
    #[serde(rename = "_links", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
}

impl Task {
    /// Returns the advertised link for `action`, if any.
    #[must_use]
    pub fn link(&self, action: Action) -> Option<&Link> {
        self.links.get(action.key())
    }

    /// Whether the server advertised `action` for this task instance.
    #[must_use]
    pub fn allows(&self, action: Action) -> bool {
        self.link(action).is_some()
    }

    /// Shallow-merges the fields present in `patch`.
    ///
    /// A patch carrying a version older than the task's current version is
    /// stale and rejected. Returns `true` if the patch was applied.
    pub fn apply_patch(&mut self, patch: &TaskPatch) -> bool {
        if patch.id != self.id {
            return false;
        }
        if patch.version.is_some_and(|v| v < self.version) {
            return false;
        }
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        if let Some(links) = &patch.links {
            self.links.clone_from(links);
        }
        true
    }

    /// Builds an update payload that carries the current version.
    #[must_use]
    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            status: Some(self.status),
            priority: Some(self.priority),
            version: Some(self.version),
        }
    }
}

/// Partial task: `id` plus any subset of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Which task this applies to.
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl From<Task> for TaskPatch {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: Some(task.title),
            description: task.description,
            status: Some(task.status),
            priority: Some(task.priority),
            version: Some(task.version),
            links: Some(task.links),
        }
    }
}

/// Create/update payload: a task minus its id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Expected version on update; ignored on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl TaskDraft {
    /// A draft with only a title set.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Checks the required fields (`title`, `status`, `priority`).
    ///
    /// # Errors
    ///
    /// Returns one message per offending field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = self.title.trim();
        if title.is_empty() {
            errors.insert("title".into(), "title must not be empty".into());
        } else if title.chars().count() > MAX_TASK_TITLE_LENGTH {
            errors.insert(
                "title".into(),
                format!("title must be at most {MAX_TASK_TITLE_LENGTH} characters"),
            );
        }
        if self.status.is_none() {
            errors.insert("status".into(), "status is required".into());
        }
        if self.priority.is_none() {
            errors.insert("priority".into(), "priority is required".into());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Merge-patch body for a status move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub status: TaskStatus,
    /// Expected current version; omitted for an unconditional patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}
