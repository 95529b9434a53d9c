use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::markers::model::{Marker, MarkerId};
use crate::persistence::MarkerCache;
use crate::utils::MarkerError;

/// Per-id counter bumped by every removal. A fetch started at an older
/// revision must not bring a removed marker back.
pub type Revision = u64;

#[derive(Debug, Default)]
struct StoreState {
    markers: BTreeMap<MarkerId, Marker>,
    revisions: HashMap<MarkerId, Revision>,
}

/// The local marker set, keyed by id. Clones share the same set.
///
/// When a cache is attached every change is mirrored into it while the set
/// is locked, so memory and cache see changes in the same order. Cache write
/// failures are logged and never fail the in-memory update.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    state: Arc<Mutex<StoreState>>,
    cache: Option<MarkerCache>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with the cached snapshot.
    pub fn with_cache(cache: MarkerCache) -> Result<Self, MarkerError> {
        let markers = cache
            .load_all()?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        Ok(Self {
            state: Arc::new(Mutex::new(StoreState {
                markers,
                revisions: HashMap::new(),
            })),
            cache: Some(cache),
        })
    }

    pub fn replace_all(&self, markers: Vec<Marker>) {
        let mut guard = self.lock();
        guard.markers.clear();
        for marker in markers {
            guard.markers.insert(marker.id, marker);
        }

        if let Some(cache) = &self.cache {
            let result = cache
                .clear()
                .and_then(|_| guard.markers.values().try_for_each(|m| cache.store(m)));
            if let Err(e) = result {
                warn!("Failed to refresh marker cache: {e}");
            }
        }
    }

    pub fn upsert(&self, marker: Marker) {
        let mut guard = self.lock();
        self.cache_store(&marker);
        guard.markers.insert(marker.id, marker);
    }

    /// Stores `marker` unless its id was removed after `revision` was read.
    /// Returns whether it was stored.
    pub fn upsert_if_current(&self, marker: Marker, revision: Revision) -> bool {
        let mut guard = self.lock();
        let current = guard.revisions.get(&marker.id).copied().unwrap_or(0);
        if current != revision {
            debug!("Dropping stale copy of marker {}", marker.id);
            return false;
        }
        self.cache_store(&marker);
        guard.markers.insert(marker.id, marker);
        true
    }

    /// Removes the marker with `id`; returns whether one was present.
    pub fn remove(&self, id: MarkerId) -> bool {
        let mut guard = self.lock();
        *guard.revisions.entry(id).or_default() += 1;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(id) {
                warn!("Failed to drop marker {id} from cache: {e}");
            }
        }
        guard.markers.remove(&id).is_some()
    }

    /// Current removal revision of `id`, for use with `upsert_if_current`.
    pub fn revision(&self, id: MarkerId) -> Revision {
        self.lock().revisions.get(&id).copied().unwrap_or(0)
    }

    pub fn get(&self, id: MarkerId) -> Option<Marker> {
        self.lock().markers.get(&id).cloned()
    }

    /// All markers ordered by id.
    pub fn snapshot(&self) -> Vec<Marker> {
        self.lock().markers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().markers.is_empty()
    }

    /// Flushes the attached cache to disk, if any.
    pub fn flush(&self) -> Result<(), MarkerError> {
        match &self.cache {
            Some(cache) => cache.flush(),
            None => Ok(()),
        }
    }

    /// GeoJSON feature collection of every marker with valid coordinates.
    pub fn to_feature_collection(&self) -> Value {
        let features: Vec<Value> = self
            .snapshot()
            .iter()
            .filter_map(|marker| match marker.to_feature() {
                Ok(feature) => Some(feature),
                Err(e) => {
                    warn!("Leaving marker out of the map: {e}");
                    None
                }
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }

    fn cache_store(&self, marker: &Marker) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(marker) {
                warn!("Failed to cache marker {}: {e}", marker.id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
