//! The `markers` module holds the marker data model and everything that
//! keeps a local copy of it current: the REST client, the in-memory store
//! and the `MarkerSync` handler driven by hub events.

pub mod api;
pub mod model;
pub mod store;
pub mod sync;

pub use api::MarkerApi;
pub use model::{Marker, MarkerId, MarkerKind};
pub use store::{MarkerStore, Revision};
pub use sync::MarkerSync;
