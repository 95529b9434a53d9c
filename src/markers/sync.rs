//! Keeps a `MarkerStore` in step with the marker server.
//!
//! `MarkerSync` is the `MarkerHandler` the binary hands to the listener.
//! Handler calls arrive on the hub reader task, so the HTTP round trips are
//! spawned onto the runtime instead of awaited in place.

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::listener::MarkerHandler;
use crate::markers::api::MarkerApi;
use crate::markers::model::{Marker, MarkerId};
use crate::markers::store::{MarkerStore, Revision};
use crate::utils::MarkerError;

#[derive(Debug, Clone)]
pub struct MarkerSync {
    api: MarkerApi,
    store: MarkerStore,
    runtime: Handle,
}

impl MarkerSync {
    pub fn new(api: MarkerApi, store: MarkerStore, runtime: Handle) -> Self {
        Self {
            api,
            store,
            runtime,
        }
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn api(&self) -> &MarkerApi {
        &self.api
    }

    /// Replaces the local set with every marker the server knows.
    pub async fn load_all(&self) -> Result<usize, MarkerError> {
        let markers = self.api.fetch_all().await?;
        let count = markers.len();
        self.store.replace_all(markers);
        info!("Loaded {count} marker(s)");
        Ok(count)
    }

    /// Fetches one marker and stores it. Returns `None` when the marker was
    /// removed while the request was in flight; the fetched copy is dropped.
    pub async fn refresh_marker(&self, id: MarkerId) -> Result<Option<Marker>, MarkerError> {
        let revision = self.store.revision(id);
        self.refresh_from(id, revision).await
    }

    async fn refresh_from(
        &self,
        id: MarkerId,
        revision: Revision,
    ) -> Result<Option<Marker>, MarkerError> {
        let marker = self.api.fetch(id).await?;
        if !self.store.upsert_if_current(marker.clone(), revision) {
            return Ok(None);
        }
        debug!("Marker {id} refreshed");
        Ok(Some(marker))
    }
}

impl MarkerHandler for MarkerSync {
    fn update_marker(&self, id: MarkerId) {
        self.remove_marker(id);
        self.request_marker(id);
    }

    fn remove_marker(&self, id: MarkerId) {
        if self.store.remove(id) {
            debug!("Marker {id} removed");
        } else {
            debug!("Marker {id} was not present");
        }
    }

    fn request_marker(&self, id: MarkerId) {
        // read before spawning so a later DeleteMarker wins over this fetch
        let revision = self.store.revision(id);
        let sync = self.clone();
        self.runtime.spawn(async move {
            if let Err(e) = sync.refresh_from(id, revision).await {
                warn!("Failed to fetch marker {id}: {e}");
            }
        });
    }
}
