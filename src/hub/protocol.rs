//! JSON hub protocol (version 1)
//!
//! Every record is a JSON object followed by the ASCII record separator
//! `0x1E`. A WebSocket text frame may carry any number of complete records.
//! The first record the server sends is the handshake response; everything
//! after it is a hub message identified by its integer `type`.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::utils::HubError;

pub const RECORD_SEPARATOR: char = '\u{1e}';
pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    StreamItem {
        invocation_id: String,
        item: Value,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Kinds this client never acts on (stream invocation, cancel, ack, ...).
    Other(u8),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    item: Option<Value>,
    result: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

/// Splits a text frame into its records, rejecting a trailing record that
/// has no separator.
pub fn split_records(text: &str) -> Result<Vec<&str>, HubError> {
    let mut parts: Vec<&str> = text.split(RECORD_SEPARATOR).collect();
    // the piece after the final separator must be empty
    match parts.pop() {
        Some("") | None => {}
        Some(rest) => {
            return Err(HubError::Protocol(format!(
                "incomplete message: {}",
                rest.chars().take(100).collect::<String>()
            )));
        }
    }
    Ok(parts.into_iter().filter(|p| !p.trim().is_empty()).collect())
}

/// The record a client sends right after the socket opens.
pub fn handshake_request() -> String {
    let body = json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION });
    format!("{body}{RECORD_SEPARATOR}")
}

/// Parses the server's handshake response. `Ok(())` means accepted.
pub fn parse_handshake_response(record: &str) -> Result<(), HubError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(HubError::Handshake(error)),
        None => Ok(()),
    }
}

pub fn parse_message(record: &str) -> Result<HubMessage, HubError> {
    let envelope: Envelope = serde_json::from_str(record)?;
    let kind = envelope.kind;
    let missing_id = || HubError::Protocol(format!("message of type {kind} has no invocationId"));

    let message = match kind {
        INVOCATION => HubMessage::Invocation {
            target: envelope
                .target
                .ok_or_else(|| HubError::Protocol("invocation has no target".to_string()))?,
            invocation_id: envelope.invocation_id,
            arguments: envelope.arguments,
        },
        STREAM_ITEM => HubMessage::StreamItem {
            invocation_id: envelope.invocation_id.ok_or_else(missing_id)?,
            item: envelope.item.unwrap_or(Value::Null),
        },
        COMPLETION => HubMessage::Completion {
            invocation_id: envelope.invocation_id.ok_or_else(missing_id)?,
            result: envelope.result,
            error: envelope.error,
        },
        PING => HubMessage::Ping,
        CLOSE => HubMessage::Close {
            error: envelope.error,
            allow_reconnect: envelope.allow_reconnect,
        },
        other => HubMessage::Other(other),
    };
    Ok(message)
}

/// Parses every record in a text frame.
pub fn parse_messages(text: &str) -> Result<Vec<HubMessage>, HubError> {
    split_records(text)?.into_iter().map(parse_message).collect()
}

/// Serializes a client-side message into a single record.
pub fn write_message(message: &HubMessage) -> Result<String, HubError> {
    let body = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            let mut body = json!({
                "type": INVOCATION,
                "target": target,
                "arguments": arguments,
            });
            if let Some(id) = invocation_id {
                body["invocationId"] = Value::String(id.clone());
            }
            body
        }
        HubMessage::Ping => json!({ "type": PING }),
        HubMessage::Close { error, .. } => match error {
            Some(error) => json!({ "type": CLOSE, "error": error }),
            None => json!({ "type": CLOSE }),
        },
        other => {
            return Err(HubError::Protocol(format!(
                "client does not send {other:?}"
            )));
        }
    };
    Ok(format!("{body}{RECORD_SEPARATOR}"))
}
