//! STOMP 1.2 client framing.
//!
//! The broker speaks STOMP over WebSocket; only the client-relevant subset
//! of the protocol is implemented here. A frame is a command line, zero or
//! more `name:value` header lines, a blank line, and a NUL-terminated body.
//! Header values are escaped in both directions for every frame except
//! CONNECT/CONNECTED, as the protocol requires.

use crate::error::RealtimeError;

/// STOMP frame commands this client sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Broker handshake acknowledgement.
    Connected,
    /// Client topic subscription.
    Subscribe,
    /// Client teardown.
    Disconnect,
    /// Broker-pushed topic message.
    Message,
    /// Broker-level failure; the connection is dead after this.
    Error,
    /// Broker acknowledgement of a receipt request.
    Receipt,
}

impl Command {
    fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
            Self::Receipt => "RECEIPT",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CONNECT" => Some(Self::Connect),
            "CONNECTED" => Some(Self::Connected),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "DISCONNECT" => Some(Self::Disconnect),
            "MESSAGE" => Some(Self::Message),
            "ERROR" => Some(Self::Error),
            "RECEIPT" => Some(Self::Receipt),
            _ => None,
        }
    }

    /// CONNECT/CONNECTED are exempt from header escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Header name/value pairs in wire order.
    pub headers: Vec<(String, String)>,
    /// Raw frame body.
    pub body: String,
}

impl Frame {
    /// Build a frame from parts.
    pub fn new(
        command: Command,
        headers: Vec<(&str, &str)>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            command,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: body.into(),
        }
    }

    /// Client handshake frame.
    pub fn connect(host: &str, heartbeat_ms: u64) -> Self {
        let heartbeat = format!("{heartbeat_ms},{heartbeat_ms}");
        Self::new(
            Command::Connect,
            vec![
                ("accept-version", "1.2"),
                ("host", host),
                ("heart-beat", heartbeat.as_str()),
            ],
            "",
        )
    }

    /// Topic subscription frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(
            Command::Subscribe,
            vec![("id", id), ("destination", destination)],
            "",
        )
    }

    /// Teardown frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect, vec![], "")
    }

    /// Broker-pushed message frame (used by test brokers).
    pub fn message(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Message, vec![("destination", destination)], body)
    }

    /// Broker error frame (used by test brokers).
    pub fn error(message: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Error, vec![("message", message)], body)
    }

    /// First value of the header named `name`, per the protocol's
    /// first-occurrence-wins rule.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire form, NUL terminator included.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
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
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from its wire form.
    pub fn parse(raw: &str) -> Result<Self, RealtimeError> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        // The head/body boundary is a blank line with either line ending.
        let (head, body) = match (raw.find("\r\n\r\n"), raw.find("\n\n")) {
            (Some(crlf), Some(lf)) if crlf < lf => (&raw[..crlf], &raw[crlf + 4..]),
            (Some(crlf), None) => (&raw[..crlf], &raw[crlf + 4..]),
            (_, Some(lf)) => (&raw[..lf], &raw[lf + 2..]),
            (None, None) => (raw, ""),
        };

        let mut lines = head.lines().map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command_line = lines
            .next()
            .ok_or_else(|| RealtimeError::Frame("empty frame".to_string()))?;
        let command = Command::parse(command_line).ok_or_else(|| {
            RealtimeError::Frame(format!("unknown command: {command_line}"))
        })?;

        let unescape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                RealtimeError::Frame(format!("malformed header line: {line}"))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, RealtimeError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(RealtimeError::Frame(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
