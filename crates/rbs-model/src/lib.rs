//! Domain types shared by the benchmark coordinator crates.
//!
//! Nothing in here performs I/O except the catalog/suite loaders, which read
//! YAML definitions from disk once at startup or once per work item.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;
