//! Configuration system for the Kanban client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use kanban_proto::stomp::HeartBeat;
use url::Url;

use crate::cli::Command;
use crate::realtime::RealtimeConfig;
use crate::store::{AnyTaskStore, ClientBuildError, HttpTaskStore, InMemoryTaskStore};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The task API URL is not a valid URL.
    #[error("invalid task API URL {url:?}: {source}")]
    InvalidUrl {
        /// The configured value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// The HTTP backend was selected without a bearer token.
    #[error("the http backend needs a token (--token, KANBAN_TOKEN or [api] token)")]
    MissingToken,

    /// The HTTP client could not be constructed from the settings.
    #[error("cannot build task API client: {0}")]
    Client(#[from] ClientBuildError),
}

/// Which [`crate::store::TaskStore`] implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// The remote REST API.
    #[default]
    Http,
    /// An in-process store, for demos.
    Memory,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    realtime: RealtimeFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    backend: Option<StoreBackend>,
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

/// `[realtime]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RealtimeFileConfig {
    enabled: Option<bool>,
    url: Option<String>,
    topic: Option<String>,
    reconnect_delay_ms: Option<u64>,
    heartbeat_outgoing_ms: Option<u64>,
    heartbeat_incoming_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// Store implementation.
    pub backend: StoreBackend,
    /// Task collection URL.
    pub base_url: String,
    /// Bearer token for the REST API and the broker.
    pub token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,

    // -- Realtime --
    /// Whether to subscribe to pushed updates.
    pub realtime_enabled: bool,
    /// Broker WebSocket URL.
    pub realtime_url: String,
    /// Broker topic.
    pub topic: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Requested STOMP heart-beat intervals.
    pub heartbeat: HeartBeat,
    /// WebSocket connect and handshake timeout.
    pub connect_timeout: Duration,
    /// Capacity of the channel carrying applied events to the CLI.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Http,
            base_url: "http://localhost:8080/api/tasks".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
            realtime_enabled: true,
            realtime_url: "ws://localhost:8080/ws/tasks".to_string(),
            topic: "/topic/task-updates".to_string(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat: HeartBeat::new(4000, 4000),
            connect_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file that exists cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let rt = &file.realtime;

        Self {
            backend: cli
                .backend
                .or(file.api.backend)
                .unwrap_or(defaults.backend),
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.api.base_url.clone())
                .unwrap_or(defaults.base_url),
            token: cli.token.clone().or_else(|| file.api.token.clone()),
            request_timeout: file
                .api
                .timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            realtime_enabled: !cli.no_realtime && rt.enabled.unwrap_or(defaults.realtime_enabled),
            realtime_url: cli
                .realtime_url
                .clone()
                .or_else(|| rt.url.clone())
                .unwrap_or(defaults.realtime_url),
            topic: cli
                .topic
                .clone()
                .or_else(|| rt.topic.clone())
                .unwrap_or(defaults.topic),
            reconnect_delay: rt
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            heartbeat: HeartBeat::new(
                rt.heartbeat_outgoing_ms
                    .unwrap_or(defaults.heartbeat.outgoing_ms),
                rt.heartbeat_incoming_ms
                    .unwrap_or(defaults.heartbeat.incoming_ms),
            ),
            connect_timeout: rt
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            event_buffer: rt.event_buffer.unwrap_or(defaults.event_buffer),
        }
    }

    /// Builds the configured task store.
    ///
    /// # Errors
    ///
    /// For the HTTP backend: [`ConfigError::MissingToken`] without a token,
    /// [`ConfigError::InvalidUrl`] if `base_url` does not parse,
    /// [`ConfigError::Client`] if it cannot serve as a collection URL.
    pub fn build_store(&self) -> Result<AnyTaskStore, ConfigError> {
        match self.backend {
            StoreBackend::Memory => Ok(AnyTaskStore::Memory(InMemoryTaskStore::new())),
            StoreBackend::Http => {
                let token = self
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .ok_or(ConfigError::MissingToken)?;
                let url = Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
                    url: self.base_url.clone(),
                    source,
                })?;
                Ok(AnyTaskStore::Http(HttpTaskStore::new(
                    url,
                    token,
                    self.request_timeout,
                )?))
            }
        }
    }

    /// Push channel settings, or `None` when realtime is disabled.
    #[must_use]
    pub fn realtime_config(&self) -> Option<RealtimeConfig> {
        self.realtime_enabled.then(|| RealtimeConfig {
            url: self.realtime_url.clone(),
            topic: self.topic.clone(),
            reconnect_delay: self.reconnect_delay,
            heartbeat: self.heartbeat,
            connect_timeout: self.connect_timeout,
            token: self.token.clone(),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board client with live updates")]
pub struct CliArgs {
    /// Task store backend.
    #[arg(long, value_enum, env = "KANBAN_BACKEND")]
    pub backend: Option<StoreBackend>,

    /// Task collection URL (e.g. `http://localhost:8080/api/tasks`).
    #[arg(long, env = "KANBAN_API_URL")]
    pub base_url: Option<String>,

    /// Bearer token sent with every request.
    #[arg(long, env = "KANBAN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Broker WebSocket URL for live updates.
    #[arg(long, env = "KANBAN_WS_URL")]
    pub realtime_url: Option<String>,

    /// Broker topic carrying task events.
    #[arg(long, env = "KANBAN_TOPIC")]
    pub topic: Option<String>,

    /// Do not subscribe to live updates.
    #[arg(long)]
    pub no_realtime: bool,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("kanban").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
