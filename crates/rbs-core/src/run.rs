use std::{
    fmt,
    path::PathBuf,
    time::Duration,
};

use rbs_exec::{SandboxHandle, SandboxRuntime};
use rbs_model::CpuSlice;
use serde_json::Value;
use tempfile::TempDir;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{cpu::CpuLedger, error::RunError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => f.write_str("succeeded"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub test_name: String,
    pub topology: String,
    pub db_slice: CpuSlice,
    pub client_slice: Option<CpuSlice>,
    /// Wall-clock time of the client sandbox.
    pub benchmark_duration: Duration,
    pub results: Value,
    /// Result file name, relative to the run directory.
    pub output_file: String,
}

/// Typed result of one orchestration pass.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(RunReport),
    Failed {
        run_id: Uuid,
        test_name: String,
        topology: String,
        error: RunError,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunOutcome::Succeeded(report) => report.run_id,
            RunOutcome::Failed { run_id, .. } => *run_id,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Succeeded(_) => RunStatus::Succeeded,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    pub fn test_name(&self) -> &str {
        match self {
            RunOutcome::Succeeded(report) => &report.test_name,
            RunOutcome::Failed { test_name, .. } => test_name,
        }
    }

    pub fn topology(&self) -> &str {
        match self {
            RunOutcome::Succeeded(report) => &report.topology,
            RunOutcome::Failed { topology, .. } => topology,
        }
    }

    pub fn error(&self) -> Option<&RunError> {
        match self {
            RunOutcome::Succeeded(_) => None,
            RunOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Error message followed by every `source()` in the chain.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cur = e.source();
    }
    out
}

/// Everything one run holds that must be given back at its end.
#[derive(Debug)]
pub(crate) struct BenchmarkRun {
    pub id: Uuid,
    pub started_at: OffsetDateTime,
    dir: Option<TempDir>,
    db_slice: Option<CpuSlice>,
    client_slice: Option<CpuSlice>,
    db_handles: Vec<SandboxHandle>,
    client_handles: Vec<SandboxHandle>,
}

impl BenchmarkRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now(),
            dir: None,
            db_slice: None,
            client_slice: None,
            db_handles: Vec::new(),
            client_handles: Vec::new(),
        }
    }

    pub fn attach_dir(&mut self, dir: TempDir) -> PathBuf {
        let path = dir.path().to_path_buf();
        self.dir = Some(dir);
        path
    }

    pub fn reserve_db(&mut self, ledger: &mut CpuLedger, slice: CpuSlice) -> Result<(), RunError> {
        ledger.reserve(slice)?;
        self.db_slice = Some(slice);
        Ok(())
    }

    pub fn reserve_client(
        &mut self,
        ledger: &mut CpuLedger,
        slice: CpuSlice,
    ) -> Result<(), RunError> {
        ledger.reserve(slice)?;
        self.client_slice = Some(slice);
        Ok(())
    }

    pub fn track_db(&mut self, handle: SandboxHandle) {
        self.db_handles.push(handle);
    }

    pub fn track_client(&mut self, handle: SandboxHandle) {
        self.client_handles.push(handle);
    }

    /// Stop every sandbox, return CPUs whose sandboxes are confirmed gone and
    /// remove the run directory. Never fails; problems are logged. Returns
    /// the time the run ended.
    pub async fn teardown(
        mut self,
        runtime: &dyn SandboxRuntime,
        ledger: &mut CpuLedger,
    ) -> OffsetDateTime {
        let db_handles = std::mem::take(&mut self.db_handles);
        let client_handles = std::mem::take(&mut self.client_handles);
        stop_group(runtime, ledger, "database", db_handles, self.db_slice.take()).await;
        stop_group(runtime, ledger, "client", client_handles, self.client_slice.take()).await;

        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(
                    target: "rbs.core.run",
                    run_id = %self.id,
                    path = %path.display(),
                    "run directory removed"
                ),
                Err(e) => warn!(
                    target: "rbs.core.run",
                    run_id = %self.id,
                    path = %path.display(),
                    error = %e,
                    "failed to remove run directory"
                ),
            }
        }
        now()
    }
}

async fn stop_group(
    runtime: &dyn SandboxRuntime,
    ledger: &mut CpuLedger,
    class: &'static str,
    handles: Vec<SandboxHandle>,
    slice: Option<CpuSlice>,
) {
    let mut pinned = slice.into_iter().collect::<Vec<_>>();
    let mut confirmed = true;
    for handle in handles {
        if let Err(e) = runtime.stop(&handle).await {
            warn!(
                target: "rbs.core.run",
                sandbox = class,
                ?handle,
                error = %e,
                "failed to stop sandbox"
            );
            ledger.defer(handle, std::mem::take(&mut pinned));
            confirmed = false;
        }
    }
    if confirmed {
        for slice in pinned {
            ledger.release(slice);
        }
    }
}

pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ReconcileError;

    #[test]
    fn error_chain_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RunError::Reconcile(ReconcileError::Read {
            path: "/tmp/out.json".into(),
            source: io,
        });
        let chain = error_chain(&err);
        assert!(chain.starts_with("failed to read results /tmp/out.json"));
        assert!(chain.ends_with(": gone"));
    }

    #[test]
    fn outcome_accessors() {
        let outcome = RunOutcome::Failed {
            run_id: Uuid::nil(),
            test_name: "t".into(),
            topology: "oss-standalone".into(),
            error: RunError::UnknownTopology("oss-standalone".into()),
        };
        assert_eq!(outcome.status(), RunStatus::Failed);
        assert!(!outcome.is_success());
        assert_eq!(outcome.topology(), "oss-standalone");
        assert!(outcome.error().is_some());
    }
}
