use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::run::RunStatus;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("metrics store error: {0}")]
    Store(String),
}

/// What a finished run reports to the metrics store.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub git_hash: String,
    pub test_name: String,
    pub topology: String,
    pub deployment_type: String,
    /// Host that executed the run.
    pub runner: String,
    pub status: RunStatus,
    /// Unix milliseconds at run start.
    pub started_at_ms: i64,
    pub benchmark_duration: Option<Duration>,
    pub results: Option<Value>,
}

/// Optional, best-effort downstream store for run summaries.
///
/// Errors are reported to the caller but never alter a run's outcome.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn push(&self, summary: &RunSummary) -> Result<(), MetricsError>;
}
