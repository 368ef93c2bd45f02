//! Minimal Engine.IO v4 / Socket.IO v5 text codec.
//!
//! Only what a dashboard subscriber needs: handshake, heartbeat, namespace
//! connect/disconnect and plain (non-binary) events.

use crate::utils::error::{LiveError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const ROOT_NAMESPACE: &str = "/";

/// Upper bound on the silence we tolerate between server pings.
pub const MAX_HEARTBEAT: Duration = Duration::from_secs(300);

/// Handshake data carried by the Engine.IO OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// Ping interval plus ping timeout, capped at [`MAX_HEARTBEAT`].
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
            .min(MAX_HEARTBEAT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| LiveError::protocol("empty Engine.IO frame"))?;
        let body = chars.as_str();

        Ok(match kind {
            '0' => EnginePacket::Open(serde_json::from_str(body)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping,
            '3' => EnginePacket::Pong,
            '4' => EnginePacket::Message(body.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(LiveError::protocol(format!(
                    "unknown Engine.IO packet type '{}'",
                    other
                )))
            }
        })
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping => "2".to_string(),
            EnginePacket::Pong => "3".to_string(),
            EnginePacket::Message(body) => format!("4{}", body),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        nsp: String,
        data: Option<Value>,
    },
    Disconnect {
        nsp: String,
    },
    Event {
        nsp: String,
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        nsp: String,
        ack_id: u64,
        data: Value,
    },
    ConnectError {
        nsp: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn nsp(&self) -> &str {
        match self {
            SocketPacket::Connect { nsp, .. }
            | SocketPacket::Disconnect { nsp }
            | SocketPacket::Event { nsp, .. }
            | SocketPacket::Ack { nsp, .. }
            | SocketPacket::ConnectError { nsp, .. } => nsp,
        }
    }

    /// Decode the body of an Engine.IO MESSAGE packet.
    pub fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| LiveError::protocol("empty Socket.IO packet"))?;
        let mut rest = chars.as_str();

        let nsp = if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    let nsp = &rest[..end];
                    rest = &rest[end + 1..];
                    nsp.to_string()
                }
                None => {
                    let nsp = rest.to_string();
                    rest = "";
                    nsp
                }
            }
        } else {
            ROOT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| LiveError::protocol(format!("bad ack id: {}", e)))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { nsp, data }),
            '1' => Ok(SocketPacket::Disconnect { nsp }),
            '2' => {
                let (name, payload) = split_event_args(data)?;
                Ok(SocketPacket::Event {
                    nsp,
                    ack_id,
                    name,
                    payload,
                })
            }
            '3' => Ok(SocketPacket::Ack {
                nsp,
                ack_id: ack_id.ok_or_else(|| LiveError::protocol("ACK without id"))?,
                data: data.unwrap_or(Value::Null),
            }),
            '4' => Ok(SocketPacket::ConnectError { nsp, data }),
            '5' | '6' => Err(LiveError::protocol(
                "binary Socket.IO packets are not supported",
            )),
            other => Err(LiveError::protocol(format!(
                "unknown Socket.IO packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, nsp, ack_id, data) = match self {
            SocketPacket::Connect { nsp, data } => ('0', nsp, None, data.clone()),
            SocketPacket::Disconnect { nsp } => ('1', nsp, None, None),
            SocketPacket::Event {
                nsp,
                ack_id,
                name,
                payload,
            } => {
                let args = if payload.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), payload.clone()])
                };
                ('2', nsp, *ack_id, Some(args))
            }
            SocketPacket::Ack { nsp, ack_id, data } => ('3', nsp, Some(*ack_id), Some(data.clone())),
            SocketPacket::ConnectError { nsp, data } => ('4', nsp, None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        if nsp != ROOT_NAMESPACE {
            out.push_str(nsp);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Socket.IO packets travel inside Engine.IO MESSAGE frames.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn split_event_args(data: Option<Value>) -> Result<(String, Value)> {
    let Some(Value::Array(mut args)) = data else {
        return Err(LiveError::protocol("EVENT payload must be an array"));
    };
    if args.is_empty() {
        return Err(LiveError::protocol("EVENT without a name"));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(LiveError::protocol(format!(
                "EVENT name must be a string, got {}",
                other
            )))
        }
    };
    let payload = if args.is_empty() {
        Value::Null
    } else {
        args.remove(0)
    };
    Ok((name, payload))
}

/// Message of a CONNECT_ERROR, e.g. `{"message":"Not authorized"}`.
pub fn connect_error_message(data: &Option<Value>) -> String {
    match data {
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("connect error")
            .to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "connect error".to_string(),
    }
}

/// Server middleware rejections we treat as credential failures.
///
/// Only explicit verdicts count; an outage of the auth backend is retryable.
pub fn is_auth_rejection(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    [
        "unauthorized",
        "not authorized",
        "forbidden",
        "authentication failed",
        "authentication required",
        "invalid token",
        "token expired",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}
