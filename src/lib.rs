//! # markerhub
//!
//! `markerhub` keeps a local set of map markers in sync with a marker server.
//! The server pushes marker events over a SignalR-style real-time hub; each
//! event names a marker id that is then removed locally or re-fetched over
//! the server's REST API.
//!
//! ## Core Modules
//!
//! - `hub`: the hub connection (negotiation, JSON hub protocol over
//!   WebSockets, event dispatch).
//! - `listener`: forwards the `UpdateMarker`, `DeleteMarker` and `AddMarker`
//!   events to a `MarkerHandler`.
//! - `markers`: the marker model, REST client, in-memory store and the
//!   `MarkerSync` handler.
//! - `persistence`: an on-disk marker snapshot backed by `sled`.
//! - `config`: loading settings from file and environment.
//! - `utils`: error types and logging setup.

pub mod config;
pub mod hub;
pub mod listener;
pub mod markers;
pub mod persistence;
pub mod utils;

#[cfg(test)]
mod test_support;
