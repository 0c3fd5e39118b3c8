//! Logging bootstrap for the benchmark coordinator.
//!
//! All crates in the workspace log through `tracing`; this crate installs the
//! global subscriber once, in the shape selected by [`LoggerConfig`].
mod logger;
pub use logger::*;
