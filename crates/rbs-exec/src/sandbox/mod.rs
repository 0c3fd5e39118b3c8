//! Isolated execution of the database-under-test and the benchmark client.
//!
//! Both sandbox classes share one shape ([`SandboxSpec`]): an image, a single
//! read-write bind mount that doubles as the working directory, host
//! networking, privileged mode and an optional CPU set. They differ only in
//! lifecycle: the database is detached and stopped explicitly, the client runs
//! in the foreground and is gone once [`SandboxRuntime::run_client`] returns.
use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use rbs_model::CpuSlice;

use crate::error::ExecResult;

mod command;
pub use command::standalone_server_args;

mod docker;
pub use docker::DockerCli;

/// Host directory exposed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    /// Absolute in-sandbox mount point, with trailing slash (`/mnt/redis/`).
    pub target: String,
}

impl BindMount {
    pub fn new(host: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            target: target.into(),
        }
    }

    /// In-sandbox path of a file placed at the root of the mount.
    pub fn inner_path(&self, file: &str) -> String {
        if self.target.ends_with('/') {
            format!("{}{file}", self.target)
        } else {
            format!("{}/{file}", self.target)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub image: String,
    pub mount: BindMount,
    pub command: Vec<String>,
    pub cpus: Option<CpuSlice>,
    pub privileged: bool,
    pub host_network: bool,
}

impl SandboxSpec {
    pub fn new(image: impl Into<String>, mount: BindMount, command: Vec<String>) -> Self {
        Self {
            image: image.into(),
            mount,
            command,
            cpus: None,
            privileged: true,
            host_network: true,
        }
    }

    pub fn with_cpus(mut self, cpus: Option<CpuSlice>) -> Self {
        self.cpus = cpus;
        self
    }
}

/// Reference to a launched sandbox, kept by the run for teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxHandle {
    /// A detached container that must be stopped.
    Container { id: String },
    /// A foreground sandbox that already exited; nothing to stop.
    Completed,
}

impl SandboxHandle {
    pub fn container_id(&self) -> Option<&str> {
        match self {
            SandboxHandle::Container { id } => Some(id),
            SandboxHandle::Completed => None,
        }
    }
}

/// Output of a foreground client sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOutput {
    pub stdout: String,
    /// Wall-clock time around the whole launch-and-wait call.
    pub duration: Duration,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Launch the detached database sandbox. Returns once the runtime accepted
    /// it; the service inside is not necessarily ready yet.
    async fn start_database(&self, spec: &SandboxSpec) -> ExecResult<SandboxHandle>;

    /// Launch the client sandbox and wait for it to exit.
    async fn run_client(&self, spec: &SandboxSpec) -> ExecResult<ClientOutput>;

    /// Request termination. Safe on handles that already stopped or never
    /// referred to a running container.
    async fn stop(&self, handle: &SandboxHandle) -> ExecResult<()>;
}
