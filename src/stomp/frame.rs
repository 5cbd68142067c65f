//! STOMP 1.2 Frame Model
//!
//! Frame layout on the wire:
//! COMMAND EOL
//! *( header EOL )
//! EOL
//! *OCTET NULL
//! *( EOL )
//!
//! A lone EOL between frames is a heart-beat.

use bytes::Bytes;
use std::fmt;

// ========================================
// WIRE CONSTANTS
// ========================================
pub const NULL: u8 = 0x00;
pub const LF: u8 = b'\n';
pub const CR: u8 = b'\r';

pub const STOMP_VERSION: &str = "1.2";

// ========================================
// HEADER NAMES
// ========================================
pub const HDR_ACCEPT_VERSION: &str = "accept-version";
pub const HDR_HOST: &str = "host";
pub const HDR_LOGIN: &str = "login";
pub const HDR_PASSCODE: &str = "passcode";
pub const HDR_HEART_BEAT: &str = "heart-beat";
pub const HDR_DESTINATION: &str = "destination";
pub const HDR_ID: &str = "id";
pub const HDR_ACK: &str = "ack";
pub const HDR_SUBSCRIPTION: &str = "subscription";
pub const HDR_MESSAGE_ID: &str = "message-id";
pub const HDR_RECEIPT: &str = "receipt";
pub const HDR_RECEIPT_ID: &str = "receipt-id";
pub const HDR_CONTENT_LENGTH: &str = "content-length";
pub const HDR_MESSAGE: &str = "message";
pub const HDR_REPLY_TO: &str = "reply-to";

// ========================================
// COMMANDS
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let cmd = match raw {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(cmd)
    }

    /// CONNECT and CONNECTED frames carry headers verbatim (no escaping).
    pub fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// FRAME
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    /// Ordered; on repeated names the first occurrence wins.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (k, v) in &self.headers {
            if k == HDR_PASSCODE {
                writeln!(f, "{}:******", k)?;
            } else {
                writeln!(f, "{}:{}", k, v)?;
            }
        }
        write!(f, "Body ({} bytes)", self.body.len())
    }
}

/// Item moved through the codec: either a full frame or a heart-beat EOL.
#[derive(Debug, Clone, PartialEq)]
pub enum StompItem {
    Frame(Frame),
    Heartbeat,
}

// ========================================
// HEART-BEAT NEGOTIATION
// ========================================

/// Parses a `heart-beat: cx,cy` header value. Malformed values mean "no heart-beat".
pub fn parse_heartbeat(value: &str) -> (u64, u64) {
    let mut parts = value.split(',').map(|p| p.trim().parse::<u64>().unwrap_or(0));
    let cx = parts.next().unwrap_or(0);
    let cy = parts.next().unwrap_or(0);
    (cx, cy)
}

/// Returns `(outgoing_ms, incoming_ms)` from the client's wish and the server's answer.
/// Zero on either side disables that direction.
pub fn negotiate_heartbeat(client: (u64, u64), server: (u64, u64)) -> (u64, u64) {
    let (cx, cy) = client;
    let (sx, sy) = server;
    let outgoing = if cx == 0 || sy == 0 { 0 } else { cx.max(sy) };
    let incoming = if cy == 0 || sx == 0 { 0 } else { cy.max(sx) };
    (outgoing, incoming)
}
