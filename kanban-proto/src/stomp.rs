//! Minimal STOMP 1.2 framing for the realtime push channel.
//!
//! One frame per WebSocket text message. A message consisting only of
//! end-of-line characters is a heart-beat and decodes to `None`.
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! ...\n
//! \n
//! body\0
//! ```

use std::fmt;
use std::str::FromStr;

/// A heart-beat on the wire is a single EOL.
pub const HEARTBEAT: &str = "\n";

/// Protocol versions offered on CONNECT.
pub const ACCEPT_VERSION: &str = "1.2";

/// Error type for STOMP frame decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The command line is not a STOMP command this client understands.
    #[error("unknown STOMP command: {0:?}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    /// A header contains an undefined escape sequence.
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),
    /// The frame ended before the blank line separating headers and body.
    #[error("frame is missing the header terminator")]
    MissingHeaderEnd,
    /// The body is not NUL-terminated where it should be.
    #[error("frame body is not NUL-terminated")]
    MissingNul,
    /// `content-length` is not a number or exceeds the remaining frame.
    #[error("invalid content-length: {0}")]
    BadContentLength(String),
}

/// STOMP frame commands used by the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim (no escaping).
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// A frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name` (repeated headers: first wins).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All headers in wire order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encodes the frame, adding `content-length` for non-empty bodies.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes one frame. Returns `Ok(None)` for a heart-beat.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] when the text is not a well-formed frame.
    pub fn decode(text: &str) -> Result<Option<Self>, FrameError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) = split_line(text).ok_or(FrameError::MissingHeaderEnd)?;
        let command: Command = command_line.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, next) = split_line(rest).ok_or(FrameError::MissingHeaderEnd)?;
            rest = next;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = Self {
            command,
            headers,
            body: String::new(),
        };

        let body = if let Some(len) = frame.get("content-length") {
            let len: usize = len
                .trim()
                .parse()
                .map_err(|_| FrameError::BadContentLength(len.to_string()))?;
            let body = rest
                .get(..len)
                .ok_or_else(|| FrameError::BadContentLength(len.to_string()))?;
            if !rest[len..].starts_with('\0') {
                return Err(FrameError::MissingNul);
            }
            body
        } else {
            let end = rest.find('\0').ok_or(FrameError::MissingNul)?;
            &rest[..end]
        };

        Ok(Some(Self {
            body: body.to_string(),
            ..frame
        }))
    }
}

/// Splits off one line, accepting `\n` or `\r\n`.
fn split_line(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('\n')?;
    let line = &text[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &text[idx + 1..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// Heart-beat intervals in milliseconds (`cx,cy` on the wire).
///
/// `outgoing_ms` is how often this side will send; `incoming_ms` is how
/// often it wants to receive. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    #[must_use]
    pub const fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Parses a `heart-beat` header value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        Some(Self::new(out.trim().parse().ok()?, inc.trim().parse().ok()?))
    }

    /// Header value for this side.
    #[must_use]
    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Effective intervals once the server's `heart-beat` is known.
    ///
    /// Each direction uses the larger of the two requested intervals, or
    /// is disabled when either side set it to zero.
    #[must_use]
    pub const fn negotiate(self, server: Self) -> Self {
        let outgoing = if self.outgoing_ms == 0 || server.incoming_ms == 0 {
            0
        } else if self.outgoing_ms > server.incoming_ms {
            self.outgoing_ms
        } else {
            server.incoming_ms
        };
        let incoming = if self.incoming_ms == 0 || server.outgoing_ms == 0 {
            0
        } else if self.incoming_ms > server.outgoing_ms {
            self.incoming_ms
        } else {
            server.outgoing_ms
        };
        Self::new(outgoing, incoming)
    }
}
