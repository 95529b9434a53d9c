//! The `listener` module forwards marker events pushed over the hub to a
//! `MarkerHandler`.

pub mod marker_listener;

pub use marker_listener::{MarkerEvent, MarkerEventKind, MarkerHandler, MarkerListener};

#[cfg(test)]
mod tests;
