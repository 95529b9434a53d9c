//! Marker snapshot backed by `sled`
//!
//! Every marker lives under a key derived from its id, so a full scan yields
//! markers ordered by id. Each entry records when it was cached; with a
//! `max_age_secs` policy, stale entries are dropped during load.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use tracing::warn;

use crate::markers::{Marker, MarkerId};
use crate::utils::MarkerError;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CachedMarker {
    pub marker: Marker,
    pub cached_at: i64,
}

#[derive(Clone)]
pub struct MarkerCache {
    db: Db,
    max_age_secs: Option<i64>,
}

impl MarkerCache {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str, max_age_secs: Option<i64>) -> Result<Self, MarkerError> {
        let db = sled::open(path)?;
        Ok(Self { db, max_age_secs })
    }

    pub fn store(&self, marker: &Marker) -> Result<(), MarkerError> {
        let entry = CachedMarker {
            marker: marker.clone(),
            cached_at: Utc::now().timestamp(),
        };
        self.db.insert(key(marker.id), serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    pub fn remove(&self, id: MarkerId) -> Result<(), MarkerError> {
        self.db.remove(key(id))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), MarkerError> {
        self.db.clear()?;
        Ok(())
    }

    /// Loads every cached marker, ordered by id. Entries that fail to decode
    /// are skipped.
    pub fn load_all(&self) -> Result<Vec<Marker>, MarkerError> {
        self.remove_stale()?;
        let mut markers = Vec::new();
        for entry in self.db.iter() {
            let (_, value) = entry?;
            match serde_json::from_slice::<CachedMarker>(&value) {
                Ok(cached) => markers.push(cached.marker),
                Err(e) => warn!("Skipping unreadable cache entry: {e}"),
            }
        }
        Ok(markers)
    }

    pub fn flush(&self) -> Result<(), MarkerError> {
        self.db.flush()?;
        Ok(())
    }

    fn remove_stale(&self) -> Result<(), MarkerError> {
        let Some(max_age) = self.max_age_secs else {
            return Ok(());
        };
        let expiry_time = Utc::now().timestamp() - max_age;

        let stale: Vec<_> = self
            .db
            .iter()
            .filter_map(|res| res.ok())
            .filter(|(_, value)| {
                serde_json::from_slice::<CachedMarker>(value)
                    .map(|cached| cached.cached_at < expiry_time)
                    .unwrap_or(false)
            })
            .map(|(key, _)| key)
            .collect();

        for key in stale {
            self.db.remove(key)?;
        }
        Ok(())
    }
}

/// Big-endian key with the sign bit flipped so negative ids sort first.
fn key(id: MarkerId) -> [u8; 4] {
    ((id as u32) ^ 0x8000_0000).to_be_bytes()
}

impl std::fmt::Debug for MarkerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerCache")
            .field("db", &"sled::Db")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}
