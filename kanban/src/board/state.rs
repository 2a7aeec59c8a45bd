//! The board's in-memory task list and its merge rules.
//!
//! Every mutation funnels through [`BoardState::apply`], which is keyed by
//! task id and idempotent: creating an existing id, patching an absent id
//! and deleting an absent id are all no-ops. That makes the result
//! independent of whether a change arrives first via a REST response or
//! via the push channel.

use kanban_proto::event::TaskEvent;
use kanban_proto::task::{Task, TaskId, TaskStatus};

/// Snapshot of the board: the task list plus load status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    tasks: Vec<Task>,
    loading: bool,
    error: Option<String>,
}

impl BoardState {
    /// An empty, idle board.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            loading: false,
            error: None,
        }
    }

    /// All tasks in board order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Whether a full load is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// The last load error, if the board is in an error state.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Ends a load whose result is being discarded, leaving the list as is.
    pub(crate) fn end_load(&mut self) {
        self.loading = false;
    }

    /// Replaces the whole list with an authoritative fetch result.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.loading = false;
        self.error = None;
    }

    /// Records a failed load: the list is cleared rather than left stale.
    pub fn fail_load(&mut self, message: impl Into<String>) {
        self.tasks.clear();
        self.loading = false;
        self.error = Some(message.into());
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Applies one change. Returns `true` if the list changed.
    pub fn apply(&mut self, event: &TaskEvent) -> bool {
        match event {
            TaskEvent::Created(task) => {
                if self.find(task.id).is_some() {
                    return false;
                }
                self.tasks.push(task.clone());
                true
            }
            TaskEvent::Patched(patch) => self
                .tasks
                .iter_mut()
                .find(|t| t.id == patch.id)
                .is_some_and(|task| {
                    let before = task.clone();
                    task.apply_patch(patch) && *task != before
                }),
            TaskEvent::Deleted(r) => {
                let len = self.tasks.len();
                self.tasks.retain(|t| t.id != r.id);
                self.tasks.len() != len
            }
        }
    }

    /// Tasks in `status`, in board order.
    pub fn column(&self, status: TaskStatus) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.status == status)
    }

    /// Each column with its tasks, in [`TaskStatus::ALL`] order.
    #[must_use]
    pub fn columns(&self) -> Vec<(TaskStatus, Vec<Task>)> {
        TaskStatus::ALL
            .iter()
            .map(|&status| (status, self.column(status).cloned().collect()))
            .collect()
    }
}
