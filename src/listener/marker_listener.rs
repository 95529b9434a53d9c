//! Marker event listener
//!
//! Binds the three marker events the server pushes onto a `MarkerHandler`:
//!
//! | target         | handler method     |
//! |----------------|--------------------|
//! | `UpdateMarker` | `update_marker`    |
//! | `DeleteMarker` | `remove_marker`    |
//! | `AddMarker`    | `request_marker`   |
//!
//! Each event carries a single integer marker id which is passed through
//! unchanged. The listener owns its `HubConnection`; the composing
//! application owns the listener.

use std::sync::Arc;

use tracing::info;

use crate::config::HubSettings;
use crate::hub::{HubConnection, HubConnectionBuilder, HubConnectionState};
use crate::markers::MarkerId;
use crate::utils::HubError;

/// Receiver of marker lifecycle events.
///
/// Methods are called on the hub reader task and must return quickly.
pub trait MarkerHandler: Send + Sync {
    fn update_marker(&self, id: MarkerId);
    fn remove_marker(&self, id: MarkerId);
    fn request_marker(&self, id: MarkerId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEventKind {
    Update,
    Delete,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    Update(MarkerId),
    Delete(MarkerId),
    Add(MarkerId),
}

impl MarkerEventKind {
    pub const ALL: [MarkerEventKind; 3] = [
        MarkerEventKind::Update,
        MarkerEventKind::Delete,
        MarkerEventKind::Add,
    ];

    /// Hub method name the server invokes.
    pub fn target(self) -> &'static str {
        match self {
            MarkerEventKind::Update => "UpdateMarker",
            MarkerEventKind::Delete => "DeleteMarker",
            MarkerEventKind::Add => "AddMarker",
        }
    }

    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.target() == target)
    }

    pub fn event(self, id: MarkerId) -> MarkerEvent {
        match self {
            MarkerEventKind::Update => MarkerEvent::Update(id),
            MarkerEventKind::Delete => MarkerEvent::Delete(id),
            MarkerEventKind::Add => MarkerEvent::Add(id),
        }
    }
}

impl MarkerEvent {
    pub fn kind(self) -> MarkerEventKind {
        match self {
            MarkerEvent::Update(_) => MarkerEventKind::Update,
            MarkerEvent::Delete(_) => MarkerEventKind::Delete,
            MarkerEvent::Add(_) => MarkerEventKind::Add,
        }
    }

    pub fn id(self) -> MarkerId {
        match self {
            MarkerEvent::Update(id) | MarkerEvent::Delete(id) | MarkerEvent::Add(id) => id,
        }
    }

    pub fn forward(self, handler: &dyn MarkerHandler) {
        match self {
            MarkerEvent::Update(id) => handler.update_marker(id),
            MarkerEvent::Delete(id) => handler.remove_marker(id),
            MarkerEvent::Add(id) => handler.request_marker(id),
        }
    }
}

#[derive(Debug)]
pub struct MarkerListener {
    connection: HubConnection,
}

impl MarkerListener {
    pub fn new(settings: &HubSettings, handler: Arc<dyn MarkerHandler>) -> Result<Self, HubError> {
        let connection = HubConnectionBuilder::from_settings(settings).build()?;
        Ok(Self::with_connection(connection, handler))
    }

    /// Registers the marker events on an existing connection.
    pub fn with_connection(connection: HubConnection, handler: Arc<dyn MarkerHandler>) -> Self {
        for kind in MarkerEventKind::ALL {
            let handler = handler.clone();
            connection.on::<MarkerId, _>(kind.target(), move |id| {
                kind.event(id).forward(handler.as_ref());
            });
        }
        Self { connection }
    }

    pub fn connection(&self) -> &HubConnection {
        &self.connection
    }

    pub fn state(&self) -> HubConnectionState {
        self.connection.state()
    }

    pub async fn start(&self) -> Result<(), HubError> {
        info!("Starting marker listener");
        self.connection.start().await
    }

    pub async fn stop(&self) -> Result<(), HubError> {
        info!("Stopping marker listener");
        self.connection.stop().await
    }
}
