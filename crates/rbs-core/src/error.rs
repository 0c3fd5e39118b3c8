use std::path::PathBuf;

use rbs_exec::{ExecError, ToolError};
use rbs_model::ModelError;
use thiserror::Error;

use crate::{
    artifact::ArtifactError, cpu::CpuError, probe::ProbeError, queue::QueueError,
    reconcile::ReconcileError,
};

/// Failure of the coordinator itself, as opposed to a single run.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("test suites in {dir} are not readable: {source}")]
    Suites {
        dir: PathBuf,
        #[source]
        source: ModelError,
    },
}

/// Why one benchmark run failed. Every variant is recorded in the run's
/// outcome; none of them stops the coordinator.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("topology {0:?} is not in the catalog")]
    UnknownTopology(String),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error("failed to create run directory: {0}")]
    Workdir(#[source] std::io::Error),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("no server binary {0:?} among the build artifacts")]
    MissingServerBinary(String),
    #[error("{stage} sandbox failed: {source}")]
    Sandbox {
        stage: &'static str,
        #[source]
        source: ExecError,
    },
    #[error(transparent)]
    NotReady(#[from] ProbeError),
    #[error("unsupported benchmark tool {0:?}")]
    UnsupportedTool(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl RunError {
    pub(crate) fn sandbox(stage: &'static str, source: ExecError) -> Self {
        RunError::Sandbox { stage, source }
    }
}
