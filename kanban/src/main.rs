//! `kanban`: command-line Kanban board client.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/kanban/config.toml`).
//!
//! ```bash
//! # Show the board
//! kanban --token "$TOKEN" list
//!
//! # Move task 3 to In Progress
//! kanban --token "$TOKEN" move 3 in-progress
//!
//! # Follow live changes
//! KANBAN_TOKEN=... kanban watch
//!
//! # Try it without a server
//! kanban --backend memory add "Write docs"
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use kanban::cli::{self, Command};
use kanban::config::{CliArgs, ClientConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Logging first so config problems are recorded too.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(err = %e, "failed to load configuration");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let command = cli.command.unwrap_or(Command::List { status: None });
    tracing::info!(backend = ?config.backend, "kanban starting");

    let mut stdout = std::io::stdout();
    match cli::run(command, &config, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::warn!(err = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging.
///
/// With a log file, output goes through a non-blocking appender and the
/// returned [`WorkerGuard`] must be held until shutdown so buffered entries
/// are flushed. Otherwise logs go to stderr, keeping stdout for command
/// output.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
