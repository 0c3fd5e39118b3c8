use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use rbs_exec::SandboxRuntime;
use rbs_model::{
    ConsumerCursor, EntryId, TestSuiteDefinition, TopologyCatalog, WorkItem, yaml_files,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::CoordinatorConfig,
    cpu::CpuLedger,
    error::{CoreError, RunError},
    metrics::MetricsSink,
    pass::{OrchestrationPass, reap},
    probe::ReadinessProbe,
    queue::{Delivery, DeliveryBody, WorkQueue},
    run::{RunOutcome, error_chain},
};

/// Entry ids remembered to recognise redeliveries.
const PROCESSED_CAPACITY: usize = 1024;

/// What one coordinator iteration did.
#[derive(Debug)]
pub enum Iteration {
    /// Nothing was delivered.
    Idle,
    /// Malformed entry, acknowledged without any run.
    Skipped { id: EntryId, reason: String },
    /// Entry this process already handled, acknowledged again.
    Duplicate(EntryId),
    Processed(EntryReport),
}

#[derive(Debug)]
pub struct EntryReport {
    pub id: EntryId,
    pub git_hash: String,
    /// One outcome per (suite × topology), in execution order.
    pub outcomes: Vec<RunOutcome>,
}

enum Fetched {
    Read(Delivery),
    Claimed(Delivery),
    Empty,
}

/// Consumes build events and runs every configured benchmark against them,
/// one run at a time.
pub struct Coordinator {
    queue: Arc<dyn WorkQueue>,
    runtime: Arc<dyn SandboxRuntime>,
    probe: Arc<dyn ReadinessProbe>,
    sink: Option<Arc<dyn MetricsSink>>,
    topologies: TopologyCatalog,
    config: CoordinatorConfig,
    cursor: ConsumerCursor,
    ledger: CpuLedger,
    processed: ProcessedIds,
    runner: String,
}

impl Coordinator {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        runtime: Arc<dyn SandboxRuntime>,
        probe: Arc<dyn ReadinessProbe>,
        sink: Option<Arc<dyn MetricsSink>>,
        topologies: TopologyCatalog,
        config: CoordinatorConfig,
        cursor: ConsumerCursor,
    ) -> Self {
        let ledger = CpuLedger::new(config.cpu_count);
        Self {
            queue,
            runtime,
            probe,
            sink,
            topologies,
            config,
            cursor,
            ledger,
            processed: ProcessedIds::new(PROCESSED_CAPACITY),
            runner: local_hostname(),
        }
    }

    /// Override the host label reported with run summaries.
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    pub fn cursor(&self) -> &ConsumerCursor {
        &self.cursor
    }

    pub fn ledger(&self) -> &CpuLedger {
        &self.ledger
    }

    /// Loop until `cancel` fires. Cancellation interrupts waiting for work,
    /// never a run in progress.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            target: "rbs.core.coordinator",
            cursor = %self.cursor,
            topologies = ?self.topologies.names(),
            cpus = self.config.cpu_count,
            "coordinator started"
        );
        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = self.fetch() => fetched,
            };

            let result = match fetched {
                Ok(fetched) => self.dispatch(fetched).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(iteration) => debug!(
                    target: "rbs.core.coordinator",
                    ?iteration,
                    "iteration done"
                ),
                Err(e) => {
                    error!(
                        target: "rbs.core.coordinator",
                        error = %error_chain(&e),
                        "iteration failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.read_retry_delay) => {}
                    }
                }
            }
        }
        info!(target: "rbs.core.coordinator", "coordinator stopped");
    }

    /// One iteration: claim or read at most one entry and process it.
    pub async fn run_once(&mut self) -> Result<Iteration, CoreError> {
        let fetched = self.fetch().await?;
        self.dispatch(fetched).await
    }

    async fn fetch(&self) -> Result<Fetched, CoreError> {
        if let Some(min_idle) = self.config.claim_min_idle {
            match self.queue.claim_stale(min_idle).await {
                Ok(Some(delivery)) => {
                    info!(target: "rbs.core.coordinator", id = %delivery.id, "claimed stale entry");
                    return Ok(Fetched::Claimed(delivery));
                }
                Ok(None) => {}
                Err(e) => warn!(
                    target: "rbs.core.coordinator",
                    error = %e,
                    "failed to claim stale entries"
                ),
            }
        }
        Ok(match self.queue.read(&self.cursor).await? {
            Some(delivery) => Fetched::Read(delivery),
            None => Fetched::Empty,
        })
    }

    async fn dispatch(&mut self, fetched: Fetched) -> Result<Iteration, CoreError> {
        match fetched {
            Fetched::Read(delivery) => self.process(delivery).await,
            Fetched::Claimed(delivery) => self.handle(delivery).await,
            Fetched::Empty => {
                if !self.cursor.is_new() {
                    info!(
                        target: "rbs.core.coordinator",
                        cursor = %self.cursor,
                        "pending history exhausted; reading new entries"
                    );
                    self.cursor.exhausted();
                }
                Ok(Iteration::Idle)
            }
        }
    }

    /// Handle an entry delivered at the current cursor, advancing it.
    #[instrument(
        level = "info",
        target = "rbs.core.coordinator",
        skip(self, delivery),
        fields(id = %delivery.id)
    )]
    pub async fn process(&mut self, delivery: Delivery) -> Result<Iteration, CoreError> {
        self.cursor.advance(delivery.id);
        self.handle(delivery).await
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<Iteration, CoreError> {
        let id = delivery.id;
        if self.processed.contains(&id) {
            info!(
                target: "rbs.core.coordinator",
                %id,
                "entry already processed; acknowledging redelivery"
            );
            self.ack(id).await;
            return Ok(Iteration::Duplicate(id));
        }

        let fields = match delivery.body {
            DeliveryBody::Fields(fields) => fields,
            DeliveryBody::Unreadable(reason) => {
                error!(target: "rbs.core.coordinator", %id, %reason, "unreadable entry; skipping");
                return Ok(self.skip(id, reason).await);
            }
        };
        let item = match WorkItem::decode(id, fields) {
            Ok(item) => item,
            Err(e) => {
                error!(
                    target: "rbs.core.coordinator",
                    %id,
                    error = %e,
                    "Missing commit information within received message; skipping"
                );
                return Ok(self.skip(id, e.to_string()).await);
            }
        };
        info!(
            target: "rbs.core.coordinator",
            %id,
            git_hash = %item.git_hash,
            run_image = %item.run_image,
            artifacts = ?item.artifacts,
            "received build"
        );

        let suite_files =
            yaml_files(&self.config.test_suites_dir).map_err(|source| CoreError::Suites {
                dir: self.config.test_suites_dir.clone(),
                source,
            })?;

        let mut outcomes = Vec::new();
        for path in suite_files {
            let suite = match TestSuiteDefinition::load(&path) {
                Ok(suite) => suite,
                Err(e) => {
                    warn!(
                        target: "rbs.core.coordinator",
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable test suite"
                    );
                    continue;
                }
            };
            outcomes.extend(self.run_suite(&item, &suite).await);
        }

        self.ack(id).await;
        self.processed.insert(id);

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            target: "rbs.core.coordinator",
            %id,
            runs = outcomes.len(),
            failed,
            "entry processed"
        );
        Ok(Iteration::Processed(EntryReport {
            id,
            git_hash: item.git_hash,
            outcomes,
        }))
    }

    async fn run_suite(&mut self, item: &WorkItem, suite: &TestSuiteDefinition) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(suite.topologies.len());
        let mut position = 0;

        for topology_name in &suite.topologies {
            let Some(topology) = self.topologies.get(topology_name) else {
                let error = RunError::UnknownTopology(topology_name.clone());
                error!(
                    target: "rbs.core.coordinator",
                    test = %suite.name,
                    topology = %topology_name,
                    error = %error_chain(&error),
                    "run failed"
                );
                outcomes.push(RunOutcome::Failed {
                    run_id: Uuid::new_v4(),
                    test_name: suite.name.clone(),
                    topology: topology_name.clone(),
                    error,
                });
                continue;
            };

            if self.ledger.has_deferred() {
                reap(&mut self.ledger, self.runtime.as_ref()).await;
            }

            let pass = OrchestrationPass {
                runtime: self.runtime.as_ref(),
                probe: self.probe.as_ref(),
                sink: self.sink.as_deref(),
                config: &self.config,
                runner: &self.runner,
            };
            let result = pass
                .execute(&mut self.ledger, item, suite, topology, position)
                .await;
            position = result.next_position;
            outcomes.push(result.outcome);
        }
        outcomes
    }

    async fn ack(&self, id: EntryId) {
        if let Err(e) = self.queue.ack(id).await {
            warn!(target: "rbs.core.coordinator", %id, error = %e, "failed to acknowledge entry");
        }
    }

    /// Acknowledge an entry that will never run, so it leaves the pending list.
    async fn skip(&mut self, id: EntryId, reason: String) -> Iteration {
        self.ack(id).await;
        self.processed.insert(id);
        Iteration::Skipped { id, reason }
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Bounded set of entry ids, evicting the oldest.
#[derive(Debug)]
struct ProcessedIds {
    capacity: usize,
    order: VecDeque<EntryId>,
    ids: HashSet<EntryId>,
}

impl ProcessedIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, id: &EntryId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: EntryId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_ids_evict_oldest() {
        let mut ids = ProcessedIds::new(2);
        ids.insert(EntryId::new(1, 0));
        ids.insert(EntryId::new(2, 0));
        ids.insert(EntryId::new(2, 0));
        assert!(ids.contains(&EntryId::new(1, 0)));

        ids.insert(EntryId::new(3, 0));
        assert!(!ids.contains(&EntryId::new(1, 0)));
        assert!(ids.contains(&EntryId::new(2, 0)));
        assert!(ids.contains(&EntryId::new(3, 0)));
    }
}
