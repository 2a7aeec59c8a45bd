//! Realtime update bridge: a STOMP-over-WebSocket subscription that turns
//! broker messages into [`TaskEvent`]s.
//!
//! [`RealtimeBridge::connect`] spawns one background session task that
//! connects, subscribes to the configured topic, and reconnects after a
//! fixed delay whenever the connection drops. Calling `connect` again while
//! a session is running does nothing; [`RealtimeBridge::disconnect`] stops
//! it and is safe to call at any time. Clones of a bridge share the same
//! session slot, so at most one session exists per bridge regardless of how
//! many callers hold it.

mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kanban_proto::event::TaskEvent;
use kanban_proto::stomp::{FrameError, HeartBeat};
use parking_lot::Mutex;
use tokio::sync::watch;

/// How long `disconnect` waits for a graceful STOMP DISCONNECT.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Callback invoked for every decoded task event.
pub type EventHandler = Arc<dyn Fn(TaskEvent) + Send + Sync>;

/// Errors that end a single push-channel session.
///
/// None of these are surfaced to callers of [`RealtimeBridge`]; the
/// session task logs them and reconnects.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Connecting or the STOMP handshake took too long.
    #[error("push channel connect timed out")]
    Timeout,

    /// The WebSocket could not be opened or failed mid-session.
    #[error("push channel connection failed: {0}")]
    Connection(String),

    /// The broker answered with an ERROR frame or an unexpected frame.
    #[error("broker rejected the session: {0}")]
    Rejected(String),

    /// The handshake reply could not be parsed.
    #[error("STOMP framing error: {0}")]
    Frame(#[from] FrameError),

    /// No data from the broker within the negotiated heart-beat window.
    #[error("no heart-beat from broker within {0:?}")]
    HeartbeatTimeout(Duration),
}

/// Push channel settings.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the broker (e.g. `ws://localhost:8080/ws/tasks`).
    pub url: String,
    /// Topic to subscribe to.
    pub topic: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Requested heart-beat intervals.
    pub heartbeat: HeartBeat,
    /// Timeout for the WebSocket connect and the STOMP handshake each.
    pub connect_timeout: Duration,
    /// Bearer token sent on CONNECT, if any.
    pub token: Option<String>,
}

impl RealtimeConfig {
    /// Settings for `url`/`topic` with default timings.
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: topic.into(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat: HeartBeat::new(4000, 4000),
            connect_timeout: Duration::from_secs(10),
            token: None,
        }
    }
}

/// A running session: its stop signal and task handle.
struct Session {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// The bridge's single session slot.
#[derive(Default)]
enum Slot {
    #[default]
    Idle,
    Running(Session),
    /// `disconnect` owns the session and is waiting for it to end.
    Stopping,
}

impl Slot {
    fn is_live(&self) -> bool {
        match self {
            Self::Idle => false,
            Self::Running(s) => !s.handle.is_finished(),
            Self::Stopping => true,
        }
    }
}

/// A session being stopped by `disconnect`. Dropping it (also when
/// `disconnect` is cancelled) aborts the task and frees the slot.
struct StopGuard<'a> {
    slot: &'a Mutex<Slot>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.handle.abort();
        *self.slot.lock() = Slot::Idle;
    }
}

struct BridgeInner {
    config: RealtimeConfig,
    session: Mutex<Slot>,
    /// True while a STOMP subscription is established.
    connected: Arc<AtomicBool>,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Slot::Running(session) = std::mem::take(self.session.get_mut()) {
            let _ = session.shutdown.send(true);
            session.handle.abort();
        }
    }
}

/// Handle to the push subscription. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RealtimeBridge {
    inner: Arc<BridgeInner>,
}

impl RealtimeBridge {
    /// Creates a bridge; nothing connects until [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                session: Mutex::new(Slot::Idle),
                connected: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// The settings this bridge was built with.
    #[must_use]
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Starts the session task unless one is already running or still
    /// stopping.
    ///
    /// Returns `true` if a new session was started. Must be called from
    /// within a tokio runtime.
    pub fn connect<F>(&self, on_event: F) -> bool
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        let mut slot = self.inner.session.lock();
        if slot.is_live() {
            tracing::debug!("realtime bridge already connected, ignoring connect");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(session::run(
            self.inner.config.clone(),
            Arc::new(on_event),
            Arc::clone(&self.inner.connected),
            shutdown_rx,
        ));
        *slot = Slot::Running(Session { shutdown, handle });
        tracing::info!(
            url = %self.inner.config.url,
            topic = %self.inner.config.topic,
            "realtime bridge started"
        );
        true
    }

    /// Stops the session if one is running.
    ///
    /// The slot stays occupied until the session task has ended, so a
    /// `connect` in the meantime cannot start a second one. Returns `true`
    /// if a session was stopped.
    pub async fn disconnect(&self) -> bool {
        let Session { shutdown, handle } = {
            let mut slot = self.inner.session.lock();
            match std::mem::replace(&mut *slot, Slot::Stopping) {
                Slot::Running(session) => session,
                other => {
                    *slot = other;
                    return false;
                }
            }
        };

        let mut stopping = StopGuard {
            slot: &self.inner.session,
            handle,
        };
        let _ = shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut stopping.handle)
            .await
            .is_err()
        {
            tracing::warn!("realtime session did not stop in time, aborting");
        }
        drop(stopping);
        self.inner.connected.store(false, Ordering::Relaxed);
        tracing::info!("realtime bridge disconnected");
        true
    }

    /// Whether a session task exists (connected or reconnecting).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.session.lock().is_live()
    }

    /// Whether the broker subscription is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }
}
