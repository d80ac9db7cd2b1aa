//! Socket.IO wire protocol
//!
//! Engine.IO v4 packets framed as WebSocket text messages, with Socket.IO v5
//! packets nested inside Engine.IO `message` packets. Only the default
//! namespace and text payloads are supported.
//!
//! | Engine.IO | Name    | Socket.IO (inside `4`) | Name          |
//! |-----------|---------|------------------------|---------------|
//! | 0         | open    | 0                      | CONNECT       |
//! | 1         | close   | 1                      | DISCONNECT    |
//! | 2         | ping    | 2                      | EVENT         |
//! | 3         | pong    | 3                      | ACK           |
//! | 4         | message | 4                      | CONNECT_ERROR |
//! | 5         | upgrade |                        |               |
//! | 6         | noop    |                        |               |

use serde::Deserialize;
use serde_json::Value;

/// Engine.IO packet type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineOpCode {
    Open = 0,
    Close = 1,
    Ping = 2,
    Pong = 3,
    Message = 4,
    Upgrade = 5,
    Noop = 6,
}

/// Socket.IO packet type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketOpCode {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

/// Handshake sent by the server in the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet (default namespace)
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client: auth object. Server: `{"sid": ...}`.
    Connect(Option<Value>),
    Disconnect,
    Event {
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        ack_id: u64,
        args: Vec<Value>,
    },
    /// Server refused the namespace connection
    ConnectError(String),
}

/// Wire decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown packet type: {0}")]
    UnknownType(char),

    #[error("Unsupported packet: {0}")]
    Unsupported(&'static str),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Invalid JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e.to_string())
    }
}

impl EnginePacket {
    /// Shorthand for a Socket.IO event packet without ack.
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        EnginePacket::Message(SocketPacket::Event {
            ack_id: None,
            name: name.into(),
            payload,
        })
    }

    /// Encode as the text of one WebSocket frame.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(payload) => format!(
                "{}{}",
                EngineOpCode::Open as u8,
                serde_json::json!({
                    "sid": payload.sid,
                    "upgrades": payload.upgrades,
                    "pingInterval": payload.ping_interval,
                    "pingTimeout": payload.ping_timeout,
                    "maxPayload": payload.max_payload,
                })
            ),
            EnginePacket::Close => (EngineOpCode::Close as u8).to_string(),
            EnginePacket::Ping(data) => format!("{}{}", EngineOpCode::Ping as u8, data),
            EnginePacket::Pong(data) => format!("{}{}", EngineOpCode::Pong as u8, data),
            EnginePacket::Message(packet) => {
                format!("{}{}", EngineOpCode::Message as u8, packet.encode())
            }
            EnginePacket::Upgrade => (EngineOpCode::Upgrade as u8).to_string(),
            EnginePacket::Noop => (EngineOpCode::Noop as u8).to_string(),
        }
    }

    /// Decode the text of one WebSocket frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl SocketPacket {
    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => (SocketOpCode::Connect as u8).to_string(),
            SocketPacket::Connect(Some(auth)) => format!("{}{}", SocketOpCode::Connect as u8, auth),
            SocketPacket::Disconnect => (SocketOpCode::Disconnect as u8).to_string(),
            SocketPacket::Event {
                ack_id,
                name,
                payload,
            } => {
                let args = if payload.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), payload.clone()])
                };
                format!(
                    "{}{}{}",
                    SocketOpCode::Event as u8,
                    ack_id.map(|id| id.to_string()).unwrap_or_default(),
                    args
                )
            }
            SocketPacket::Ack { ack_id, args } => {
                format!("{}{}{}", SocketOpCode::Ack as u8, ack_id, Value::Array(args.clone()))
            }
            SocketPacket::ConnectError(message) => format!(
                "{}{}",
                SocketOpCode::ConnectError as u8,
                serde_json::json!({ "message": message })
            ),
        }
    }

    /// Decode a Socket.IO packet (the part after the Engine.IO `4`).
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = strip_namespace(chars.as_str());

        match kind {
            '0' => Ok(SocketPacket::Connect(parse_optional_json(rest)?)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let (ack_id, body) = split_ack_id(rest)?;
                let mut args = match serde_json::from_str::<Value>(body)? {
                    Value::Array(args) => args.into_iter(),
                    _ => return Err(ProtocolError::Malformed("event arguments must be an array".into())),
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(ProtocolError::Malformed("event name missing".into())),
                };
                let payload = args.next().unwrap_or(Value::Null);
                Ok(SocketPacket::Event {
                    ack_id,
                    name,
                    payload,
                })
            }
            '3' => {
                let (ack_id, body) = split_ack_id(rest)?;
                let ack_id = ack_id.ok_or_else(|| ProtocolError::Malformed("ack id missing".into()))?;
                let args = match serde_json::from_str::<Value>(body)? {
                    Value::Array(args) => args,
                    other => vec![other],
                };
                Ok(SocketPacket::Ack { ack_id, args })
            }
            '4' => {
                let message = match parse_optional_json(rest)? {
                    Some(Value::Object(map)) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("Connection refused")
                        .to_string(),
                    Some(Value::String(message)) => message,
                    _ => "Connection refused".to_string(),
                };
                Ok(SocketPacket::ConnectError(message))
            }
            '5' | '6' => Err(ProtocolError::Unsupported("binary packets")),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Drop a leading `/namespace,` segment.
fn strip_namespace(text: &str) -> &str {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => &text[idx + 1..],
            None => "",
        }
    } else {
        text
    }
}

fn split_ack_id(text: &str) -> Result<(Option<u64>, &str), ProtocolError> {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Ok((None, text));
    }
    let id = text[..digits]
        .parse()
        .map_err(|_| ProtocolError::Malformed("ack id out of range".into()))?;
    Ok((Some(id), &text[digits..]))
}

fn parse_optional_json(text: &str) -> Result<Option<Value>, ProtocolError> {
    if text.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(text)?))
    }
}
