use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{
    error::{ExecError, ExecResult},
    sandbox::{ClientOutput, SandboxHandle, SandboxRuntime, SandboxSpec},
    util::{cmd_program, run_captured},
};

/// [`SandboxRuntime`] backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Use another CLI binary with a docker-compatible `run`/`stop` surface (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments of `docker run` for the spec.
    pub fn run_args(spec: &SandboxSpec, detach: bool) -> ExecResult<Vec<String>> {
        if spec.command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if detach {
            args.push("--detach".to_string());
        }
        if spec.privileged {
            args.push("--privileged".to_string());
        }
        if spec.host_network {
            args.push("--network=host".to_string());
        }
        args.push(format!(
            "--volume={}:{}:rw",
            spec.mount.host.display(),
            spec.mount.target
        ));
        args.push(format!("--workdir={}", spec.mount.target));
        if let Some(cpus) = &spec.cpus {
            args.push(format!("--cpuset-cpus={}", cpus.cpuset()));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        Ok(args)
    }
}

#[async_trait]
impl SandboxRuntime for DockerCli {
    async fn start_database(&self, spec: &SandboxSpec) -> ExecResult<SandboxHandle> {
        let args = Self::run_args(spec, true)?;
        trace!(target: "rbs.exec.docker", program = %self.program, ?args, "spawn detached");

        let output = run_captured(cmd_program(&self.program, &args)).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ExecError::MissingContainerId);
        }
        debug!(
            target: "rbs.exec.docker",
            container = %id,
            image = %spec.image,
            "database sandbox started"
        );
        Ok(SandboxHandle::Container { id })
    }

    async fn run_client(&self, spec: &SandboxSpec) -> ExecResult<ClientOutput> {
        let args = Self::run_args(spec, false)?;
        trace!(target: "rbs.exec.docker", program = %self.program, ?args, "spawn foreground");

        let started = Instant::now();
        let output = run_captured(cmd_program(&self.program, &args)).await?;
        let duration = started.elapsed();

        debug!(target: "rbs.exec.docker", image = %spec.image, ?duration, "client sandbox exited");
        Ok(ClientOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            duration,
        })
    }

    async fn stop(&self, handle: &SandboxHandle) -> ExecResult<()> {
        let Some(id) = handle.container_id() else {
            trace!(target: "rbs.exec.docker", "handle without container; nothing to stop");
            return Ok(());
        };

        let args = vec!["stop".to_string(), id.to_string()];
        match run_captured(cmd_program(&self.program, &args)).await {
            Ok(_) => {
                debug!(target: "rbs.exec.docker", container = %id, "sandbox stopped");
                Ok(())
            }
            // Auto-removed containers vanish as soon as they exit.
            Err(ExecError::NonZeroExit { stderr, .. }) if is_gone(&stderr) => {
                debug!(target: "rbs.exec.docker", container = %id, "sandbox already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn is_gone(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("is not running")
}
