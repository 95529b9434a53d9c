//! The `persistence` module keeps a snapshot of the marker set on disk so a
//! restarted client has the last known markers before the first fetch
//! completes.
//!
//! It uses `sled` as an embedded key-value store.

pub mod sled_store;

pub use sled_store::{CachedMarker, MarkerCache};

#[cfg(test)]
mod tests;
