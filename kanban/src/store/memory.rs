//! In-process [`TaskStore`] with server-like semantics.
//!
//! Ids are assigned from 1, new tasks start at version 0, every update or
//! status patch bumps the version by one, and a mismatched expected
//! version is rejected with [`StoreError::Conflict`]. Each returned task
//! carries the affordance links a real server would advertise.
//!
//! Clones share the same underlying collection.

use std::sync::Arc;

use kanban_proto::task::{FieldErrors, Link, Links, Priority, Task, TaskDraft, TaskId, TaskStatus};
use parking_lot::Mutex;

use super::{StoreError, TaskStore};

/// Default base used when building affordance hrefs.
const DEFAULT_BASE_HREF: &str = "/api/tasks";

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    tasks: Vec<Task>,
}

impl MemoryState {
    fn position(&self, id: TaskId) -> Result<usize, StoreError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))
    }
}

/// Task store holding its collection in memory.
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
    base_href: Arc<str>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_href(DEFAULT_BASE_HREF)
    }

    /// An empty store whose affordance links point under `base_href`.
    #[must_use]
    pub fn with_base_href(base_href: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            base_href: Arc::from(base_href.trim_end_matches('/')),
        }
    }

    /// A store pre-populated with `tasks`, kept as given (ids and versions).
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            state.tasks = tasks.into_iter().collect();
            state.last_id = state.tasks.iter().map(|t| t.id.get()).max().unwrap_or(0);
        }
        store
    }

    /// A copy of every stored task, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    fn links_for(&self, id: TaskId) -> Links {
        let href = format!("{}/{id}", self.base_href);
        let mut links = Links::new();
        links.insert("self".into(), Link::new(href.clone(), "GET"));
        links.insert("update".into(), Link::new(href.clone(), "PUT"));
        links.insert("patch".into(), Link::new(href.clone(), "PATCH"));
        links.insert("delete".into(), Link::new(href, "DELETE"));
        links
    }
}

/// Validates a draft and returns its required enum fields.
fn required(draft: &TaskDraft) -> Result<(TaskStatus, Priority), StoreError> {
    draft.validate().map_err(StoreError::validation)?;
    draft
        .status
        .zip(draft.priority)
        .ok_or_else(|| StoreError::validation(FieldErrors::new()))
}

impl TaskStore for InMemoryTaskStore {
    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .tasks
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect())
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        let state = self.state.lock();
        let idx = state.position(id)?;
        Ok(state.tasks[idx].clone())
    }

    async fn create(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        let (status, priority) = required(draft)?;
        let mut state = self.state.lock();
        state.last_id += 1;
        let id = TaskId::new(state.last_id);
        let task = Task {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            status,
            priority,
            version: 0,
            links: self.links_for(id),
        };
        state.tasks.push(task.clone());
        tracing::debug!(id = %id, "in-memory task created");
        Ok(task)
    }

    async fn update(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError> {
        let (status, priority) = required(draft)?;
        let mut state = self.state.lock();
        let idx = state.position(id)?;
        let links = self.links_for(id);
        let task = &mut state.tasks[idx];
        if let Some(expected) = draft.version
            && expected != task.version
        {
            return Err(StoreError::Conflict {
                id,
                message: format!("expected version {expected}, found {}", task.version),
            });
        }
        task.title = draft.title.trim().to_string();
        task.description.clone_from(&draft.description);
        task.status = status;
        task.priority = priority;
        task.version += 1;
        task.links = links;
        Ok(task.clone())
    }

    async fn patch_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        expected_version: Option<u64>,
    ) -> Result<Task, StoreError> {
        let mut state = self.state.lock();
        let idx = state.position(id)?;
        let task = &mut state.tasks[idx];
        if let Some(expected) = expected_version
            && expected != task.version
        {
            return Err(StoreError::Conflict {
                id,
                message: format!("expected version {expected}, found {}", task.version),
            });
        }
        task.status = status;
        task.version += 1;
        Ok(task.clone())
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let idx = state.position(id)?;
        state.tasks.remove(idx);
        Ok(())
    }
}
