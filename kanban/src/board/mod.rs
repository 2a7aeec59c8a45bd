//! Board state reconciler.
//!
//! [`Board`] owns the session's task list and keeps it consistent with the
//! remote store. User actions go through the store and merge the response
//! back; pushed events from the [`RealtimeBridge`] go through the same
//! [`Board::apply_event`] entry point. The state lock is never held across
//! an `.await`.

pub mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kanban_proto::event::TaskEvent;
use kanban_proto::task::{Task, TaskDraft, TaskId, TaskStatus};
use parking_lot::Mutex;

pub use state::BoardState;

use crate::realtime::RealtimeBridge;
use crate::store::{StoreError, TaskStore};

/// Errors surfaced by board operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The store rejected or failed the request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task is not on the board, so there is nothing to act on.
    #[error("task {0} is not on the board")]
    UnknownTask(TaskId),
}

impl BoardError {
    /// A message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(StoreError::Validation { message, .. }) => {
                format!("Please correct the task: {message}")
            }
            Self::Store(StoreError::Conflict { id, .. }) => {
                format!("Task {id} was changed elsewhere; the board has been refreshed.")
            }
            Self::Store(StoreError::NotFound(id)) => format!("Task {id} no longer exists."),
            Self::Store(StoreError::Remote { status, message }) => {
                format!("The task service failed ({status}): {message}")
            }
            Self::Store(StoreError::Unreachable(_)) => {
                "Cannot reach the task service.".to_string()
            }
            Self::Store(StoreError::InvalidResponse(_)) => {
                "The task service sent an unexpected response.".to_string()
            }
            Self::UnknownTask(id) => format!("Task {id} is not on the board."),
        }
    }

    /// Whether the board is consistent again and the user can simply retry
    /// or correct their input.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Store(
                StoreError::Validation { .. }
                    | StoreError::Conflict { .. }
                    | StoreError::NotFound(_)
            ) | Self::UnknownTask(_)
        )
    }
}

/// Result of dropping a task onto a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The task was already in that column; nothing was sent.
    Unchanged,
    /// The store accepted the new status.
    Moved(Task),
}

/// The board view model over a [`TaskStore`].
pub struct Board<S> {
    store: S,
    state: Arc<Mutex<BoardState>>,
    active: Arc<AtomicBool>,
    realtime: Option<RealtimeBridge>,
}

impl<S: TaskStore> Board<S> {
    /// A board with its own empty state.
    pub fn new(store: S) -> Self {
        Self::with_state(store, Arc::new(Mutex::new(BoardState::new())))
    }

    /// A board over an explicitly constructed state container.
    pub fn with_state(store: S, state: Arc<Mutex<BoardState>>) -> Self {
        Self {
            store,
            state,
            active: Arc::new(AtomicBool::new(true)),
            realtime: None,
        }
    }

    /// Attaches a push bridge; it is connected by
    /// [`connect_realtime`](Self::connect_realtime) and torn down by
    /// [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn with_realtime(mut self, bridge: RealtimeBridge) -> Self {
        self.realtime = Some(bridge);
        self
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The attached push bridge, if any.
    pub const fn realtime(&self) -> Option<&RealtimeBridge> {
        self.realtime.as_ref()
    }

    /// The shared state container.
    pub fn state(&self) -> Arc<Mutex<BoardState>> {
        Arc::clone(&self.state)
    }

    /// Whether the board still accepts state changes.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> BoardState {
        self.state.lock().clone()
    }

    /// All tasks in board order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks().to_vec()
    }

    /// Looks up a task by id.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().find(id).cloned()
    }

    /// Tasks in one column, in board order.
    pub fn column(&self, status: TaskStatus) -> Vec<Task> {
        self.state.lock().column(status).cloned().collect()
    }

    /// All three columns.
    pub fn columns(&self) -> Vec<(TaskStatus, Vec<Task>)> {
        self.state.lock().columns()
    }

    /// Replaces the board with the store's full list.
    ///
    /// # Errors
    ///
    /// Returns the store error; the list is cleared and the error recorded
    /// in the state.
    pub async fn load(&self) -> Result<(), BoardError> {
        self.state.lock().begin_load();
        let result = self.store.list(None).await;

        let mut state = self.state.lock();
        if !self.is_active() {
            state.end_load();
            tracing::debug!("board shut down during load, discarding result");
            return Ok(());
        }
        match result {
            Ok(tasks) => {
                tracing::info!(count = tasks.len(), "board loaded");
                state.replace_all(tasks);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(err = %e, "board load failed");
                let err = BoardError::from(e);
                state.fail_load(err.user_message());
                Err(err)
            }
        }
    }

    /// Creates a task and appends it to the board.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] is returned without any request when the
    /// draft is incomplete; other store errors are passed through.
    pub async fn create(&self, draft: &TaskDraft) -> Result<Task, BoardError> {
        draft.validate().map_err(StoreError::validation)?;
        let task = self.store.create(draft).await?;
        self.apply_event(&TaskEvent::Created(task.clone()));
        Ok(task)
    }

    /// Replaces a task's fields.
    ///
    /// # Errors
    ///
    /// As for [`create`](Self::create); a conflict resynchronizes the board
    /// and a missing task is dropped locally before the error is returned.
    pub async fn update(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, BoardError> {
        draft.validate().map_err(StoreError::validation)?;
        match self.store.update(id, draft).await {
            Ok(task) => {
                self.apply_event(&TaskEvent::Patched(task.clone().into()));
                Ok(task)
            }
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Store errors are passed through; on [`StoreError::NotFound`] the
    /// local entry is removed as well.
    pub async fn delete(&self, id: TaskId) -> Result<(), BoardError> {
        match self.store.remove(id).await {
            Ok(()) => {
                self.apply_event(&TaskEvent::deleted(id));
                Ok(())
            }
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Drops task `id` onto the `status` column.
    ///
    /// Dropping onto the task's own column sends nothing. Otherwise one
    /// status patch is sent with the task's current version.
    ///
    /// # Errors
    ///
    /// [`BoardError::UnknownTask`] if the board does not hold `id`. A
    /// [`StoreError::Conflict`] is returned after the board has been
    /// re-fetched; a [`StoreError::NotFound`] after the stale entry has
    /// been removed.
    pub async fn move_task(&self, id: TaskId, status: TaskStatus) -> Result<MoveOutcome, BoardError> {
        let (current, version) = {
            let state = self.state.lock();
            let task = state.find(id).ok_or(BoardError::UnknownTask(id))?;
            (task.status, task.version)
        };
        if current == status {
            tracing::debug!(id = %id, status = %status, "dropped onto own column, nothing to do");
            return Ok(MoveOutcome::Unchanged);
        }

        match self.store.patch_status(id, status, Some(version)).await {
            Ok(task) => {
                self.apply_event(&TaskEvent::Patched(task.clone().into()));
                Ok(MoveOutcome::Moved(task))
            }
            Err(e) => Err(self.recover(e).await),
        }
    }

    /// Applies a change from any source. Returns `true` if the list changed.
    ///
    /// Ignored once the board has been shut down.
    pub fn apply_event(&self, event: &TaskEvent) -> bool {
        apply_if_active(&self.state, &self.active, event)
    }

    /// A callback that feeds pushed events into this board.
    pub fn event_handler(&self) -> impl Fn(TaskEvent) + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        let active = Arc::clone(&self.active);
        move |event| {
            apply_if_active(&state, &active, &event);
        }
    }

    /// Connects the attached push bridge, feeding it into this board.
    ///
    /// Returns `false` if there is no bridge or it was already connected.
    pub fn connect_realtime(&self) -> bool {
        self.connect_realtime_with(|_, _| {})
    }

    /// Like [`connect_realtime`](Self::connect_realtime), additionally
    /// calling `on_applied` with each event and whether it changed the list.
    pub fn connect_realtime_with<F>(&self, on_applied: F) -> bool
    where
        F: Fn(&TaskEvent, bool) + Send + Sync + 'static,
    {
        let Some(bridge) = &self.realtime else {
            return false;
        };
        let state = Arc::clone(&self.state);
        let active = Arc::clone(&self.active);
        bridge.connect(move |event| {
            let changed = apply_if_active(&state, &active, &event);
            on_applied(&event, changed);
        })
    }

    /// Stops applying changes and disconnects the push bridge.
    ///
    /// In-flight requests still complete but no longer touch the state.
    pub async fn shutdown(&self) {
        {
            // Flipped under the state lock so no apply can straddle it.
            let _state = self.state.lock();
            self.active.store(false, Ordering::Release);
        }
        if let Some(bridge) = &self.realtime {
            bridge.disconnect().await;
        }
        tracing::info!("board shut down");
    }

    /// Brings local state back in line after a failed mutation.
    async fn recover(&self, err: StoreError) -> BoardError {
        match &err {
            StoreError::Conflict { id, .. } => {
                tracing::warn!(id = %id, "version conflict, resynchronizing board");
                if let Err(resync) = self.load().await {
                    tracing::warn!(err = %resync, "resync after conflict failed");
                }
            }
            StoreError::NotFound(id) => {
                tracing::info!(id = %id, "task vanished remotely, removing local entry");
                self.apply_event(&TaskEvent::deleted(*id));
            }
            _ => {}
        }
        BoardError::Store(err)
    }
}

/// Applies `event` unless the board has been shut down; the flag is read
/// under the state lock, the same lock `shutdown` flips it under.
fn apply_if_active(state: &Mutex<BoardState>, active: &AtomicBool, event: &TaskEvent) -> bool {
    let mut state = state.lock();
    if !active.load(Ordering::Acquire) {
        tracing::debug!(kind = event.kind(), id = %event.task_id(), "board inactive, event ignored");
        return false;
    }
    let changed = state.apply(event);
    drop(state);
    tracing::debug!(kind = event.kind(), id = %event.task_id(), changed, "event applied");
    changed
}
