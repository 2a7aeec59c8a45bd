//! Subcommands of the `kanban` binary.
//!
//! Each command builds a store from the resolved [`ClientConfig`], runs
//! through a [`Board`] where board semantics matter (moves, watch), and
//! writes plain-text output to the given writer.

use std::io::Write;

use kanban_proto::event::TaskEvent;
use kanban_proto::task::{Priority, Task, TaskDraft, TaskId, TaskStatus};
use tokio::sync::mpsc;

use crate::board::{Board, BoardError, MoveOutcome};
use crate::config::{ClientConfig, ConfigError};
use crate::realtime::RealtimeBridge;
use crate::store::{StoreError, TaskStore};

/// Errors from running a subcommand.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not produce a store.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A board or store operation failed.
    #[error("{}", .0.user_message())]
    Board(#[from] BoardError),

    /// Writing output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Board(BoardError::Store(err))
    }
}

/// What to do.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the board, or one column with --status.
    List {
        /// Only tasks in this column (`TO_DO`, `IN_PROGRESS`, `DONE`).
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Show one task with its available actions.
    Show {
        /// Task id.
        id: TaskId,
    },
    /// Create a task.
    Add {
        /// Title (required, at most 256 characters).
        title: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Initial column.
        #[arg(long, default_value = "TO_DO")]
        status: TaskStatus,
        /// Priority (`LOW`, `MED`, `HIGH`).
        #[arg(long, default_value = "MED")]
        priority: Priority,
    },
    /// Change a task's title, description or priority.
    Edit {
        /// Task id.
        id: TaskId,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New priority.
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Move a task to another column.
    Move {
        /// Task id.
        id: TaskId,
        /// Target column.
        status: TaskStatus,
    },
    /// Delete a task.
    Rm {
        /// Task id.
        id: TaskId,
    },
    /// Show the board and print live changes until Ctrl-C.
    Watch,
}

/// Runs `command` against the configured store.
///
/// # Errors
///
/// Returns [`CliError`] for configuration, store and output failures.
pub async fn run<W: Write + Send>(
    command: Command,
    config: &ClientConfig,
    out: &mut W,
) -> Result<(), CliError> {
    let store = config.build_store()?;
    tracing::debug!(backend = store.backend_name(), ?command, "running command");

    match command {
        Command::List { status: None } => {
            let board = Board::new(store);
            board.load().await?;
            print_columns(out, &board.columns())?;
        }
        Command::List {
            status: Some(status),
        } => {
            let tasks = store.list(Some(status)).await?;
            writeln!(out, "{} ({})", status.label(), tasks.len())?;
            for task in &tasks {
                print_line(out, task)?;
            }
        }
        Command::Show { id } => {
            let task = store.get(id).await?;
            print_detail(out, &task)?;
        }
        Command::Add {
            title,
            description,
            status,
            priority,
        } => {
            let mut draft = TaskDraft::new(title)
                .with_status(status)
                .with_priority(priority);
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            let task = Board::new(store).create(&draft).await?;
            writeln!(out, "created task {}", task.id)?;
            print_detail(out, &task)?;
        }
        Command::Edit {
            id,
            title,
            description,
            priority,
        } => {
            let mut draft = store.get(id).await?.to_draft();
            if let Some(title) = title {
                draft.title = title;
            }
            if description.is_some() {
                draft.description = description;
            }
            if priority.is_some() {
                draft.priority = priority;
            }
            let task = Board::new(store).update(id, &draft).await?;
            writeln!(out, "updated task {} (version {})", task.id, task.version)?;
        }
        Command::Move { id, status } => {
            let board = Board::new(store);
            board.load().await?;
            match board.move_task(id, status).await? {
                MoveOutcome::Unchanged => writeln!(out, "task {id} is already in {}", status.label())?,
                MoveOutcome::Moved(task) => writeln!(
                    out,
                    "moved task {id} to {} (version {})",
                    status.label(),
                    task.version
                )?,
            }
        }
        Command::Rm { id } => {
            Board::new(store).delete(id).await?;
            writeln!(out, "deleted task {id}")?;
        }
        Command::Watch => watch(store, config, out).await?,
    }
    Ok(())
}

/// Loads the board, subscribes and prints each pushed change until Ctrl-C.
async fn watch<S, W>(store: S, config: &ClientConfig, out: &mut W) -> Result<(), CliError>
where
    S: TaskStore,
    W: Write + Send,
{
    let mut board = Board::new(store);
    if let Some(rt) = config.realtime_config() {
        board = board.with_realtime(RealtimeBridge::new(rt));
    }
    board.load().await?;
    print_columns(out, &board.columns())?;

    let (tx, mut rx) = mpsc::channel::<(TaskEvent, bool)>(config.event_buffer.max(1));
    let subscribed = board.connect_realtime_with(move |event, changed| {
        if tx.try_send((event.clone(), changed)).is_err() {
            tracing::warn!("output is lagging, dropping change notice");
        }
    });
    if subscribed {
        writeln!(out, "watching for changes, Ctrl-C to stop")?;
    } else {
        writeln!(out, "live updates are disabled")?;
    }
    out.flush()?;

    let result = loop {
        tokio::select! {
            Some((event, changed)) = rx.recv() => {
                if let Err(e) = print_event(out, &event, changed, &board) {
                    break Err(e);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(err = %e, "cannot listen for Ctrl-C");
                }
                break Ok(());
            }
        }
    };

    board.shutdown().await;
    result.map_err(CliError::from)
}

fn print_event<W: Write, S: TaskStore>(
    out: &mut W,
    event: &TaskEvent,
    changed: bool,
    board: &Board<S>,
) -> std::io::Result<()> {
    let note = if changed { "" } else { " (no change)" };
    writeln!(out, "{} task {}{note}", event.kind(), event.task_id())?;
    let counts: Vec<String> = board
        .columns()
        .iter()
        .map(|(status, tasks)| format!("{}: {}", status.label(), tasks.len()))
        .collect();
    writeln!(out, "  {}", counts.join(" | "))?;
    out.flush()
}

fn print_columns<W: Write>(out: &mut W, columns: &[(TaskStatus, Vec<Task>)]) -> std::io::Result<()> {
    for (status, tasks) in columns {
        writeln!(out, "{} ({})", status.label(), tasks.len())?;
        for task in tasks {
            print_line(out, task)?;
        }
    }
    Ok(())
}

fn print_line<W: Write>(out: &mut W, task: &Task) -> std::io::Result<()> {
    writeln!(
        out,
        "  #{:<5} [{}] {}",
        task.id.get(),
        task.priority.label(),
        task.title
    )
}

fn print_detail<W: Write>(out: &mut W, task: &Task) -> std::io::Result<()> {
    writeln!(out, "#{} {}", task.id, task.title)?;
    writeln!(out, "  status:   {}", task.status.label())?;
    writeln!(out, "  priority: {}", task.priority.label())?;
    writeln!(out, "  version:  {}", task.version)?;
    if let Some(description) = &task.description {
        writeln!(out, "  {description}")?;
    }
    let actions: Vec<&str> = task.links.keys().map(String::as_str).collect();
    if !actions.is_empty() {
        writeln!(out, "  actions:  {}", actions.join(", "))?;
    }
    Ok(())
}
