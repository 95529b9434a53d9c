//! The `utils` module provides definitions shared across `markerhub`:
//! the error types and the tracing subscriber setup.

pub mod error;
pub mod logging;

pub use error::{HubError, MarkerError};
