//! The `hub` module is a client for SignalR-style real-time hubs speaking the
//! JSON hub protocol over WebSockets.
//!
//! - `protocol`: record framing, handshake and hub message kinds
//! - `negotiate`: the `/negotiate` exchange and WebSocket URL derivation
//! - `handlers`: the target name to handler dispatch table
//! - `connection`: `HubConnection`, its lifecycle and background tasks

pub mod connection;
pub mod handlers;
pub mod negotiate;
pub mod protocol;

pub use connection::{HubConnection, HubConnectionBuilder, HubConnectionState};
pub use handlers::HandlerTable;
pub use protocol::HubMessage;
