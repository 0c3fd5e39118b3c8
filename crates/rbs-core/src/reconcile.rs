use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("failed to read results {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("results {path} are not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read back the structured result the client left in the run directory.
pub fn reconcile(path: &Path) -> Result<Value, ReconcileError> {
    let raw = std::fs::read(path).map_err(|source| ReconcileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ReconcileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
