//! The background session loop behind [`super::RealtimeBridge`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kanban_proto::event;
use kanban_proto::stomp::{ACCEPT_VERSION, Command, Frame, HEARTBEAT, HeartBeat};
use tokio::sync::watch;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

use super::{BridgeError, EventHandler, RealtimeConfig};

/// Write half of the broker WebSocket.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Read half of the broker WebSocket.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Missed-beat tolerance: the broker may be this many intervals late.
const HEARTBEAT_TOLERANCE: u32 = 2;

/// How a session that did not fail came to an end.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// `disconnect` was called (or every bridge handle was dropped).
    Shutdown,
    /// The broker closed the connection.
    Closed,
}

/// Runs sessions until shutdown, waiting `reconnect_delay` between them.
pub(super) async fn run(
    config: RealtimeConfig,
    on_event: EventHandler,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let outcome = session(&config, &on_event, &connected, &mut shutdown).await;
        connected.store(false, Ordering::Relaxed);

        match outcome {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Closed) => {
                tracing::info!(url = %config.url, "push channel closed by broker");
            }
            Err(e) => {
                tracing::warn!(url = %config.url, attempt, err = %e, "push channel session failed");
            }
        }

        tracing::debug!(delay = ?config.reconnect_delay, "scheduling push channel reconnect");
        tokio::select! {
            () = tokio::time::sleep(config.reconnect_delay) => {}
            () = stop_requested(&mut shutdown) => break,
        }
    }
    tracing::debug!("push channel session task exiting");
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// One connect → subscribe → receive cycle.
async fn session(
    config: &RealtimeConfig,
    on_event: &EventHandler,
    connected: &AtomicBool,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, BridgeError> {
    let (mut sender, mut reader) = tokio::select! {
        result = open(config) => result?,
        () = stop_requested(shutdown) => return Ok(SessionEnd::Shutdown),
    };

    let heartbeat = tokio::select! {
        result = handshake(config, &mut sender, &mut reader) => result?,
        () = stop_requested(shutdown) => {
            let _ = sender.close().await;
            return Ok(SessionEnd::Shutdown);
        }
    };

    let subscription = format!("sub-{}", Uuid::now_v7());
    let subscribe = Frame::new(Command::Subscribe)
        .header("id", subscription.as_str())
        .header("destination", config.topic.as_str());
    send_frame(&mut sender, &subscribe).await?;
    connected.store(true, Ordering::Relaxed);
    tracing::info!(
        topic = %config.topic,
        subscription = %subscription,
        heartbeat = %heartbeat.to_header(),
        "subscribed to task updates"
    );

    let mut ping = outgoing_interval(heartbeat);
    let grace = incoming_grace(heartbeat);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            () = stop_requested(shutdown) => {
                let _ = send_frame(&mut sender, &Frame::new(Command::Disconnect)).await;
                let _ = sender.close().await;
                return Ok(SessionEnd::Shutdown);
            }
            () = tick(ping.as_mut()) => {
                sender
                    .send(Message::Text(HEARTBEAT.into()))
                    .await
                    .map_err(|e| BridgeError::Connection(e.to_string()))?;
            }
            () = watchdog(last_seen, grace) => {
                return Err(BridgeError::HeartbeatTimeout(grace.unwrap_or_default()));
            }
            msg = reader.next() => {
                last_seen = Instant::now();
                match msg {
                    None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                    Some(Err(e)) => return Err(BridgeError::Connection(e.to_string())),
                    Some(Ok(Message::Text(text))) => {
                        dispatch(text.as_str(), &subscription, on_event)?;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => dispatch(text, &subscription, on_event)?,
                        Err(e) => tracing::warn!(err = %e, "non-UTF-8 push frame, skipping"),
                    },
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Opens the WebSocket within `connect_timeout`.
async fn open(config: &RealtimeConfig) -> Result<(WsSender, WsReader), BridgeError> {
    let (ws_stream, _response) =
        tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
            .await
            .map_err(|_| BridgeError::Timeout)?
            .map_err(|e| BridgeError::Connection(e.to_string()))?;
    Ok(ws_stream.split())
}

/// Sends CONNECT and waits for CONNECTED; returns the negotiated heart-beat.
async fn handshake(
    config: &RealtimeConfig,
    sender: &mut WsSender,
    reader: &mut WsReader,
) -> Result<HeartBeat, BridgeError> {
    let host = Url::parse(&config.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());
    let mut connect = Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("host", host)
        .header("heart-beat", config.heartbeat.to_header());
    if let Some(token) = &config.token {
        connect = connect.header("Authorization", format!("Bearer {token}"));
    }
    send_frame(sender, &connect).await?;

    let reply = tokio::time::timeout(config.connect_timeout, next_frame(reader))
        .await
        .map_err(|_| BridgeError::Timeout)??;
    match reply.command {
        Command::Connected => {
            let server = reply
                .get("heart-beat")
                .and_then(HeartBeat::parse)
                .unwrap_or_default();
            Ok(config.heartbeat.negotiate(server))
        }
        Command::Error => Err(BridgeError::Rejected(error_message(&reply))),
        other => Err(BridgeError::Rejected(format!(
            "expected CONNECTED, got {other}"
        ))),
    }
}

/// Reads until a complete non-heart-beat frame arrives.
async fn next_frame(reader: &mut WsReader) -> Result<Frame, BridgeError> {
    loop {
        let text = match reader.next().await {
            None | Some(Ok(Message::Close(_))) => {
                return Err(BridgeError::Connection(
                    "connection closed during handshake".into(),
                ));
            }
            Some(Err(e)) => return Err(BridgeError::Connection(e.to_string())),
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
            Some(Ok(_)) => continue,
        };
        if let Some(frame) = Frame::decode(&text)? {
            return Ok(frame);
        }
    }
}

/// Handles one inbound text message.
///
/// Malformed frames and payloads are logged and dropped; only an ERROR
/// frame ends the session.
fn dispatch(text: &str, subscription: &str, on_event: &EventHandler) -> Result<(), BridgeError> {
    let frame = match Frame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::warn!(err = %e, "malformed STOMP frame, skipping");
            return Ok(());
        }
    };

    match frame.command {
        Command::Message => {
            if let Some(sub) = frame.get("subscription")
                && sub != subscription
            {
                tracing::debug!(subscription = sub, "message for another subscription, ignoring");
                return Ok(());
            }
            match event::decode(&frame.body) {
                Ok(event) => {
                    tracing::debug!(kind = event.kind(), id = %event.task_id(), "task event received");
                    on_event(event);
                }
                Err(e) => {
                    tracing::warn!(
                        err = %e,
                        destination = frame.get("destination").unwrap_or_default(),
                        "dropping malformed task event"
                    );
                }
            }
            Ok(())
        }
        Command::Error => Err(BridgeError::Rejected(error_message(&frame))),
        Command::Receipt => Ok(()),
        other => {
            tracing::debug!(command = %other, "ignoring unexpected STOMP frame");
            Ok(())
        }
    }
}

fn error_message(frame: &Frame) -> String {
    frame
        .get("message")
        .map_or_else(|| frame.body.clone(), str::to_string)
}

async fn send_frame(sender: &mut WsSender, frame: &Frame) -> Result<(), BridgeError> {
    sender
        .send(Message::Text(frame.encode().into()))
        .await
        .map_err(|e| BridgeError::Connection(e.to_string()))
}

fn outgoing_interval(heartbeat: HeartBeat) -> Option<Interval> {
    (heartbeat.outgoing_ms > 0).then(|| {
        let period = Duration::from_millis(heartbeat.outgoing_ms);
        tokio::time::interval_at(Instant::now() + period, period)
    })
}

fn incoming_grace(heartbeat: HeartBeat) -> Option<Duration> {
    (heartbeat.incoming_ms > 0)
        .then(|| Duration::from_millis(heartbeat.incoming_ms) * HEARTBEAT_TOLERANCE)
}

/// Next outgoing heart-beat tick; pending forever when disabled.
async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Fires when nothing has arrived for `grace`; pending forever when disabled.
async fn watchdog(last_seen: Instant, grace: Option<Duration>) {
    match grace {
        Some(grace) => tokio::time::sleep_until(last_seen + grace).await,
        None => std::future::pending().await,
    }
}
