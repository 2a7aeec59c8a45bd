//! Task store abstraction for the Kanban client.
//!
//! Defines the [`TaskStore`] trait that every backing implementation must
//! satisfy. Concrete implementations:
//! - [`http::HttpTaskStore`]: the remote REST API
//! - [`memory::InMemoryTaskStore`]: an in-process store with server-like
//!   semantics, for demos and tests
//!
//! [`AnyTaskStore`] selects one of them at runtime from configuration.

pub mod http;
pub mod memory;

use std::future::Future;

use kanban_proto::task::{FieldErrors, Task, TaskDraft, TaskId, TaskStatus};

pub use http::{ClientBuildError, HttpTaskStore};
pub use memory::InMemoryTaskStore;

/// Errors that can occur during task store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The draft is missing required fields or has invalid values.
    #[error("validation failed: {message}")]
    Validation {
        /// Summary suitable for display.
        message: String,
        /// Field name → message.
        errors: FieldErrors,
    },

    /// The expected version no longer matches the stored task.
    #[error("task {id} was modified concurrently: {message}")]
    Conflict {
        /// The task that was being changed.
        id: TaskId,
        /// Server-provided detail.
        message: String,
    },

    /// The task does not exist (any more).
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Any other non-success response.
    #[error("task service returned {status}: {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Server message, or the status reason.
        message: String,
    },

    /// No response at all (connection refused, DNS, timeout).
    #[error("task service unreachable: {0}")]
    Unreachable(String),

    /// A success response whose body could not be decoded.
    #[error("invalid response from task service: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Builds a [`StoreError::Validation`] from field messages.
    #[must_use]
    pub fn validation(errors: FieldErrors) -> Self {
        let message = errors
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self::Validation { message, errors }
    }

    /// Field errors carried by a validation failure, if any.
    #[must_use]
    pub const fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Async CRUD + status-patch capability over a task collection.
///
/// No implementation retries on failure; retry policy belongs to callers.
pub trait TaskStore: Send + Sync {
    /// Lists tasks, optionally only those in `status`.
    fn list(
        &self,
        status: Option<TaskStatus>,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Fetches one task.
    fn get(&self, id: TaskId) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Creates a task; the store assigns the id and version 0.
    fn create(&self, draft: &TaskDraft) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Replaces a task's fields; bumps its version.
    fn update(
        &self,
        id: TaskId,
        draft: &TaskDraft,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Changes only the status. With `expected_version`, fails with
    /// [`StoreError::Conflict`] unless it matches the stored version.
    fn patch_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        expected_version: Option<u64>,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Deletes a task.
    fn remove(&self, id: TaskId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A task store chosen at runtime.
#[derive(Clone)]
pub enum AnyTaskStore {
    /// Remote REST API.
    Http(HttpTaskStore),
    /// In-process store.
    Memory(InMemoryTaskStore),
}

impl AnyTaskStore {
    /// Short backend name for logs.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Memory(_) => "memory",
        }
    }
}

impl TaskStore for AnyTaskStore {
    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, StoreError> {
        match self {
            Self::Http(s) => s.list(status).await,
            Self::Memory(s) => s.list(status).await,
        }
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        match self {
            Self::Http(s) => s.get(id).await,
            Self::Memory(s) => s.get(id).await,
        }
    }

    async fn create(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        match self {
            Self::Http(s) => s.create(draft).await,
            Self::Memory(s) => s.create(draft).await,
        }
    }

    async fn update(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError> {
        match self {
            Self::Http(s) => s.update(id, draft).await,
            Self::Memory(s) => s.update(id, draft).await,
        }
    }

    async fn patch_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        expected_version: Option<u64>,
    ) -> Result<Task, StoreError> {
        match self {
            Self::Http(s) => s.patch_status(id, status, expected_version).await,
            Self::Memory(s) => s.patch_status(id, status, expected_version).await,
        }
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        match self {
            Self::Http(s) => s.remove(id).await,
            Self::Memory(s) => s.remove(id).await,
        }
    }
}
