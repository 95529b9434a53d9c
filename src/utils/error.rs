//! The `error` module defines the error types used within `markerhub`.
//!
//! `HubError` covers everything that can go wrong on the hub connection,
//! from negotiation through the handshake to dispatching server invocations.
//! `MarkerError` covers the REST API, coordinate parsing and the on-disk cache.

use std::time::Duration;

use thiserror::Error;

use crate::hub::HubConnectionState;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid hub url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("negotiation failed: {0}")]
    Negotiate(String),

    #[error("negotiation exceeded the maximum of {0} redirects")]
    TooManyRedirects(usize),

    #[error("server does not offer the WebSockets transport with text framing")]
    NoWebSocketTransport,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("handshake rejected by server: {0}")]
    Handshake(String),

    #[error("connecting to the hub timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("connection closed before the handshake completed")]
    ClosedDuringHandshake,

    #[error("cannot {action} while the connection is {state:?}")]
    InvalidState {
        action: &'static str,
        state: HubConnectionState,
    },

    #[error("hub connection is not active")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handler for {target} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("no handler registered for {0}")]
    NoHandler(String),

    #[error("server timeout elapsed after {0:?} without receiving a message")]
    ServerTimeout(Duration),

    #[error("server closed the connection with an error: {0}")]
    ServerClosed(String),
}

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("marker api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid marker api url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("marker {id} has an invalid coordinate {value:?}")]
    InvalidCoordinate { id: i32, value: String },

    #[error("marker cache error: {0}")]
    Cache(#[from] sled::Error),

    #[error("malformed marker json: {0}")]
    Json(#[from] serde_json::Error),
}
