//! One (work item × suite × topology) benchmark run.
use rbs_exec::{
    BindMount, SandboxHandle, SandboxRuntime, SandboxSpec, standalone_server_args, tool_for,
};
use rbs_model::{TestSuiteDefinition, TopologySpec, WorkItem};
use time::{OffsetDateTime, macros::format_description};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    artifact::materialize,
    config::CoordinatorConfig,
    cpu::{CpuLedger, allocate},
    error::RunError,
    metrics::{MetricsSink, RunSummary},
    probe::ReadinessProbe,
    reconcile::reconcile,
    run::{BenchmarkRun, RunOutcome, RunReport, error_chain},
};

/// Outcome of a pass and the CPU position the next topology of the suite starts at.
#[derive(Debug)]
pub struct PassResult {
    pub outcome: RunOutcome,
    pub next_position: usize,
}

/// Collaborators shared by every pass of a coordinator.
pub struct OrchestrationPass<'a> {
    pub runtime: &'a dyn SandboxRuntime,
    pub probe: &'a dyn ReadinessProbe,
    pub sink: Option<&'a dyn MetricsSink>,
    pub config: &'a CoordinatorConfig,
    /// Label of this host in metrics.
    pub runner: &'a str,
}

impl OrchestrationPass<'_> {
    /// Drive one run to completion. Teardown always happens, whatever step failed.
    pub async fn execute(
        &self,
        ledger: &mut CpuLedger,
        item: &WorkItem,
        suite: &TestSuiteDefinition,
        topology: &TopologySpec,
        position: usize,
    ) -> PassResult {
        let mut run = BenchmarkRun::new();
        let span = info_span!(
            target: "rbs.core.pass",
            "run",
            run_id = %run.id,
            test = %suite.name,
            topology = %topology.name,
        );

        async move {
            let mut next_position = position;
            let result = self
                .drive(ledger, &mut run, item, suite, topology, position, &mut next_position)
                .await;

            let run_id = run.id;
            let started_at = run.started_at;
            let finished_at = run.teardown(self.runtime, ledger).await;
            let elapsed = finished_at - started_at;

            let outcome = match result {
                Ok(report) => {
                    info!(
                        target: "rbs.core.pass",
                        benchmark_duration = ?report.benchmark_duration,
                        total = %elapsed,
                        output = %report.output_file,
                        "run succeeded"
                    );
                    RunOutcome::Succeeded(report)
                }
                Err(error) => {
                    warn!(
                        target: "rbs.core.pass",
                        error = %error_chain(&error),
                        total = %elapsed,
                        "run failed"
                    );
                    RunOutcome::Failed {
                        run_id,
                        test_name: suite.name.clone(),
                        topology: topology.name.clone(),
                        error,
                    }
                }
            };

            self.push_metrics(item, &outcome, started_at).await;
            PassResult {
                outcome,
                next_position,
            }
        }
        .instrument(span)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        ledger: &mut CpuLedger,
        run: &mut BenchmarkRun,
        item: &WorkItem,
        suite: &TestSuiteDefinition,
        topology: &TopologySpec,
        position: usize,
        next_position: &mut usize,
    ) -> Result<RunReport, RunError> {
        let layout = &self.config.layout;

        // Positions advance even when a later step fails, so the next topology
        // of the suite never reuses these CPUs.
        let (db_slice, next) = allocate(topology.resources.requests.cpus, position)?;
        *next_position = next;
        let client_slice = match &suite.clientconfig.resources {
            Some(resources) => {
                let (slice, next) = allocate(resources.requests.cpus, *next_position)?;
                *next_position = next;
                Some(slice)
            }
            None => None,
        };
        run.reserve_db(ledger, db_slice)?;
        if let Some(slice) = client_slice {
            run.reserve_client(ledger, slice)?;
        }
        debug!(target: "rbs.core.pass", %db_slice, ?client_slice, "cpus allocated");

        let tool_name = suite.clientconfig.tool.as_str();
        let tool =
            tool_for(tool_name).ok_or_else(|| RunError::UnsupportedTool(tool_name.to_string()))?;

        let dir = tempfile::Builder::new()
            .prefix("rbs-")
            .tempdir_in(&self.config.work_root)
            .map_err(RunError::Workdir)?;
        let dir = run.attach_dir(dir);

        let artifacts = materialize(item, &item.artifacts, &dir)?;
        if !artifacts.contains_key(&layout.server_artifact) {
            return Err(RunError::MissingServerBinary(layout.server_artifact.clone()));
        }

        let db_mount = BindMount::new(&dir, &layout.db_mount);
        let server_args = standalone_server_args(
            &db_mount.inner_path(&layout.server_artifact),
            layout.db_port,
            &layout.db_mount,
            &suite.dbconfig.parameters,
        );
        let db_spec =
            SandboxSpec::new(&item.run_image, db_mount, server_args).with_cpus(Some(db_slice));
        let handle = self
            .runtime
            .start_database(&db_spec)
            .await
            .map_err(|e| RunError::sandbox("database", e))?;
        info!(
            target: "rbs.core.pass",
            image = %item.run_image,
            ?handle,
            "database sandbox started"
        );
        run.track_db(handle);

        self.probe.wait_ready(&layout.db_host, layout.db_port).await?;

        let output_file = result_file_name(
            run.started_at,
            &item.git_hash,
            &suite.name,
            &self.config.deployment_type,
        );
        let client_mount = BindMount::new(&dir, &layout.client_mount);
        let binary = suite
            .clientconfig
            .binary
            .as_deref()
            .unwrap_or_else(|| tool.default_binary());
        let invocation = tool.prepare(
            &suite.clientconfig,
            binary,
            &layout.db_host,
            layout.db_port,
            &client_mount.inner_path(&output_file),
        )?;
        let client_image = suite
            .clientconfig
            .run_image
            .as_deref()
            .unwrap_or_else(|| tool.default_image());
        info!(
            target: "rbs.core.pass",
            image = %client_image,
            command = %invocation.line,
            "running benchmark client"
        );

        let client_spec = SandboxSpec::new(client_image, client_mount, invocation.argv)
            .with_cpus(client_slice);
        let client = self.runtime.run_client(&client_spec).await;
        run.track_client(SandboxHandle::Completed);
        let output = client.map_err(|e| RunError::sandbox("client", e))?;

        if output.duration < self.config.min_stable_duration {
            warn!(
                target: "rbs.core.pass",
                duration = ?output.duration,
                minimum = ?self.config.min_stable_duration,
                "benchmark ran shorter than the minimum stable duration; results may be unstable"
            );
        }

        if let Err(e) = self.probe.shutdown(&layout.db_host, layout.db_port).await {
            warn!(target: "rbs.core.pass", error = %e, "database shutdown request failed");
        }

        let output_path = dir.join(&output_file);
        tool.post_process(&output.stdout, &output_path)?;
        let results = reconcile(&output_path)?;

        Ok(RunReport {
            run_id: run.id,
            test_name: suite.name.clone(),
            topology: topology.name.clone(),
            db_slice,
            client_slice,
            benchmark_duration: output.duration,
            results,
            output_file,
        })
    }

    async fn push_metrics(
        &self,
        item: &WorkItem,
        outcome: &RunOutcome,
        started_at: OffsetDateTime,
    ) {
        let Some(sink) = self.sink else {
            return;
        };

        let (benchmark_duration, results) = match outcome {
            RunOutcome::Succeeded(report) => {
                (Some(report.benchmark_duration), Some(report.results.clone()))
            }
            RunOutcome::Failed { .. } => (None, None),
        };
        let summary = RunSummary {
            run_id: outcome.run_id(),
            git_hash: item.git_hash.clone(),
            test_name: outcome.test_name().to_string(),
            topology: outcome.topology().to_string(),
            deployment_type: self.config.deployment_type.clone(),
            runner: self.runner.to_string(),
            status: outcome.status(),
            started_at_ms: unix_millis(started_at),
            benchmark_duration,
            results,
        };
        match sink.push(&summary).await {
            Ok(()) => debug!(target: "rbs.core.pass", "run summary pushed"),
            Err(e) => warn!(target: "rbs.core.pass", error = %e, "failed to push run summary"),
        }
    }
}

/// `<YYYY-MM-DD-HH-MM-SS>-<git_hash>-<test>-<deployment>.json`, with path
/// separators in the test name replaced.
pub fn result_file_name(
    started_at: OffsetDateTime,
    git_hash: &str,
    test_name: &str,
    deployment_type: &str,
) -> String {
    let stamp = started_at
        .format(format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]"))
        .unwrap_or_else(|_| started_at.unix_timestamp().to_string());
    let test = test_name.replace(['/', '\\'], "_");
    format!("{stamp}-{git_hash}-{test}-{deployment_type}.json")
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Retry the stops whose confirmation failed in earlier runs and release
/// their CPUs once confirmed.
pub async fn reap(ledger: &mut CpuLedger, runtime: &dyn SandboxRuntime) {
    for deferred in ledger.take_deferred() {
        match runtime.stop(&deferred.handle).await {
            Ok(()) => {
                info!(
                    target: "rbs.core.pass",
                    handle = ?deferred.handle,
                    "deferred sandbox stop confirmed"
                );
                for slice in deferred.slices {
                    ledger.release(slice);
                }
            }
            Err(e) => {
                warn!(
                    target: "rbs.core.pass",
                    handle = ?deferred.handle,
                    error = %e,
                    "deferred sandbox stop failed again"
                );
                ledger.defer(deferred.handle, deferred.slices);
            }
        }
    }
}
