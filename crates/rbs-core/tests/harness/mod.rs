//! In-memory doubles for the coordinator's collaborators.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rbs_core::{
    CoordinatorConfig, Coordinator, Delivery, MetricsError, MetricsSink, ProbeError, QueueError,
    ReadinessProbe, RunSummary, WorkQueue,
};
use rbs_exec::{ClientOutput, ExecError, ExecResult, SandboxHandle, SandboxRuntime, SandboxSpec};
use rbs_model::{ConsumerCursor, EntryFields, EntryId, TopologyCatalog};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const TOPOLOGIES: &str = r#"
version: 0.1
spec:
  setups:
    - name: oss-standalone
      type: oss-standalone
      redis_topology:
        primaries: 1
        replicas: 0
      resources:
        requests:
          cpus: "1"
          memory: "10g"
    - name: oss-standalone-wide
      type: oss-standalone
      redis_topology:
        primaries: 1
      resources:
        requests:
          cpus: 1.5
"#;

pub const CSV_STDOUT: &str = "\"test\",\"rps\",\"avg_latency_ms\"\n\
                              \"SET\",\"86956.52\",\"0.310\"\n\
                              \"GET\",\"90909.09\",\"0.290\"\n";

pub const SERVER_BINARY: &[u8] = b"\x7fELF-redis-server";

pub fn redis_benchmark_suite(name: &str, topologies: &[&str]) -> String {
    format!(
        r#"
name: {name}
description: full suite
redis-topologies:
{}
dbconfig:
  configuration-parameters:
    save: '""'
    port: 12000
clientconfig:
  tool: redis-benchmark
  arguments: -t set,get -n 1000
"#,
        topology_list(topologies)
    )
}

pub fn memtier_suite(name: &str, topologies: &[&str]) -> String {
    format!(
        r#"
name: {name}
redis-topologies:
{}
clientconfig:
  tool: memtier_benchmark
  run_image: redislabs/memtier_benchmark:edge
  arguments: --ratio 1:10 --test-time 30
  resources:
    requests:
      cpus: 2
"#,
        topology_list(topologies)
    )
}

fn topology_list(topologies: &[&str]) -> String {
    topologies
        .iter()
        .map(|t| format!("  - {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_fields(git_hash: Option<&str>) -> EntryFields {
    let mut fields = EntryFields::new();
    if let Some(hash) = git_hash {
        fields.insert("git_hash".into(), hash.as_bytes().to_vec());
    }
    fields.insert("build_image".into(), b"gcc:8.5".to_vec());
    fields.insert("run_image".into(), b"redis:6.2.4".to_vec());
    fields.insert("build_artifacts".into(), b"redis-server".to_vec());
    fields.insert("redis-server".into(), SERVER_BINARY.to_vec());
    fields
}

pub fn delivery(ms: u64, fields: EntryFields) -> Delivery {
    Delivery::new(EntryId::new(ms, 0), fields)
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeQueue {
    reads: Mutex<VecDeque<Delivery>>,
    claims: Mutex<VecDeque<Delivery>>,
    acks: Mutex<Vec<EntryId>>,
    cursors: Mutex<Vec<String>>,
    failing_reads: AtomicUsize,
    /// Cancelled once a blocking read finds nothing left.
    drained: Mutex<Option<CancellationToken>>,
}

impl FakeQueue {
    pub fn push(&self, delivery: Delivery) {
        self.reads.lock().unwrap().push_back(delivery);
    }

    pub fn push_claim(&self, delivery: Delivery) {
        self.claims.lock().unwrap().push_back(delivery);
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn cancel_when_drained(&self, token: CancellationToken) {
        *self.drained.lock().unwrap() = Some(token);
    }

    pub fn acks(&self) -> Vec<EntryId> {
        self.acks.lock().unwrap().clone()
    }

    pub fn cursors(&self) -> Vec<String> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkQueue for FakeQueue {
    async fn read(&self, cursor: &ConsumerCursor) -> Result<Option<Delivery>, QueueError> {
        self.cursors.lock().unwrap().push(cursor.as_arg());
        if self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueueError::Backend("connection reset".into()));
        }

        let next = self.reads.lock().unwrap().pop_front();
        match next {
            Some(delivery) => Ok(Some(delivery)),
            None if cursor.is_new() => {
                let token = self.drained.lock().unwrap().clone();
                if let Some(token) = token {
                    token.cancel();
                }
                std::future::pending().await
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, id: EntryId) -> Result<(), QueueError> {
        self.acks.lock().unwrap().push(id);
        Ok(())
    }

    async fn claim_stale(&self, _min_idle: Duration) -> Result<Option<Delivery>, QueueError> {
        Ok(self.claims.lock().unwrap().pop_front())
    }
}

// ---------------------------------------------------------------------------
// Sandbox runtime
// ---------------------------------------------------------------------------

/// A launched sandbox with a snapshot of its mount at launch time.
#[derive(Debug, Clone)]
pub struct Launch {
    pub spec: SandboxSpec,
    /// (file name, content, permission bits)
    pub files: Vec<(String, Vec<u8>, u32)>,
}

#[derive(Debug, Clone)]
pub enum ClientBehaviour {
    /// Print CSV on stdout.
    Stdout(String),
    /// Write these bytes at the `--json-out-file` path.
    WriteResult(Vec<u8>),
    Fail,
}

pub struct FakeRuntime {
    databases: Mutex<Vec<Launch>>,
    clients: Mutex<Vec<Launch>>,
    stops: Mutex<Vec<SandboxHandle>>,
    behaviour: Mutex<ClientBehaviour>,
    fail_stops: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(behaviour: ClientBehaviour) -> Self {
        Self {
            databases: Mutex::default(),
            clients: Mutex::default(),
            stops: Mutex::default(),
            behaviour: Mutex::new(behaviour),
            fail_stops: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn fail_stops(&self, fail: bool) {
        self.fail_stops.store(fail, Ordering::SeqCst);
    }

    pub fn databases(&self) -> Vec<Launch> {
        self.databases.lock().unwrap().clone()
    }

    pub fn clients(&self) -> Vec<Launch> {
        self.clients.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<SandboxHandle> {
        self.stops.lock().unwrap().clone()
    }
}

fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>, u32)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .map(|p| {
            let mode = fs::metadata(&p).unwrap().permissions().mode() & 0o777;
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read(&p).unwrap(), mode)
        })
        .collect();
    files.sort();
    files
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    async fn start_database(&self, spec: &SandboxSpec) -> ExecResult<SandboxHandle> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.databases.lock().unwrap().push(Launch {
            spec: spec.clone(),
            files: snapshot(&spec.mount.host),
        });
        Ok(SandboxHandle::Container { id: format!("db-{n}") })
    }

    async fn run_client(&self, spec: &SandboxSpec) -> ExecResult<ClientOutput> {
        self.clients.lock().unwrap().push(Launch {
            spec: spec.clone(),
            files: snapshot(&spec.mount.host),
        });
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            ClientBehaviour::Stdout(stdout) => Ok(ClientOutput {
                stdout,
                duration: Duration::from_secs(12),
            }),
            ClientBehaviour::WriteResult(bytes) => {
                let inner = spec
                    .command
                    .iter()
                    .find_map(|a| a.strip_prefix("--json-out-file="))
                    .expect("memtier invocation carries an output file");
                let file = inner.strip_prefix(spec.mount.target.as_str()).unwrap();
                fs::write(spec.mount.host.join(file), bytes).unwrap();
                Ok(ClientOutput {
                    stdout: String::new(),
                    duration: Duration::from_secs(30),
                })
            }
            ClientBehaviour::Fail => Err(ExecError::NonZeroExit {
                code: 1,
                stderr: "Could not connect to Redis".into(),
            }),
        }
    }

    async fn stop(&self, handle: &SandboxHandle) -> ExecResult<()> {
        self.stops.lock().unwrap().push(handle.clone());
        if self.fail_stops.load(Ordering::SeqCst) && handle.container_id().is_some() {
            return Err(ExecError::NonZeroExit {
                code: 1,
                stderr: "Cannot connect to the Docker daemon".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Probe and metrics
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProbe {
    pub not_ready: AtomicBool,
    pub waits: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

#[async_trait]
impl ReadinessProbe for FakeProbe {
    async fn wait_ready(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if self.not_ready.load(Ordering::SeqCst) {
            return Err(ProbeError::NotReady {
                addr: format!("{host}:{port}"),
                attempts: 3,
                last_error: "Connection refused".into(),
            });
        }
        Ok(())
    }

    async fn shutdown(&self, _host: &str, _port: u16) -> Result<(), ProbeError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub failing: bool,
    pub pushed: Mutex<Vec<RunSummary>>,
}

impl FakeSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetricsSink for FakeSink {
    async fn push(&self, summary: &RunSummary) -> Result<(), MetricsError> {
        self.pushed.lock().unwrap().push(summary.clone());
        if self.failing {
            return Err(
                MetricsError::Store("READONLY You can't write against a read only replica".into()),
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Scratch suites directory and run root, plus the doubles.
pub struct TestEnv {
    pub scratch: TempDir,
    pub queue: Arc<FakeQueue>,
    pub runtime: Arc<FakeRuntime>,
    pub probe: Arc<FakeProbe>,
    pub sink: Option<Arc<FakeSink>>,
    pub cpu_count: usize,
}

impl TestEnv {
    pub fn new(behaviour: ClientBehaviour) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        fs::create_dir(scratch.path().join("suites")).unwrap();
        fs::create_dir(scratch.path().join("work")).unwrap();
        Self {
            scratch,
            queue: Arc::new(FakeQueue::default()),
            runtime: Arc::new(FakeRuntime::new(behaviour)),
            probe: Arc::new(FakeProbe::default()),
            sink: None,
            cpu_count: 8,
        }
    }

    pub fn with_sink(mut self, sink: FakeSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpu_count = cpus;
        self
    }

    pub fn add_suite(&self, file: &str, yaml: &str) {
        fs::write(self.suites_dir().join(file), yaml).unwrap();
    }

    pub fn suites_dir(&self) -> PathBuf {
        self.scratch.path().join("suites")
    }

    pub fn work_root(&self) -> PathBuf {
        self.scratch.path().join("work")
    }

    /// Entries left in the run root.
    pub fn leftovers(&self) -> usize {
        fs::read_dir(self.work_root()).unwrap().count()
    }

    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            test_suites_dir: self.suites_dir(),
            work_root: self.work_root(),
            cpu_count: self.cpu_count,
            read_retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    pub fn coordinator(&self, cursor: ConsumerCursor) -> Coordinator {
        let topologies = TopologyCatalog::from_yaml_str("topologies.yml", TOPOLOGIES).unwrap();
        let sink = self.sink.clone().map(|s| s as Arc<dyn MetricsSink>);
        Coordinator::new(
            self.queue.clone(),
            self.runtime.clone(),
            self.probe.clone(),
            sink,
            topologies,
            self.config(),
            cursor,
        )
        .with_runner("bench-host-1")
    }
}
