use std::{path::PathBuf, time::Duration};

/// Fixed in-sandbox layout of a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayout {
    /// Mount point (and working directory) of the database sandbox.
    pub db_mount: String,
    /// Mount point (and working directory) of the client sandbox.
    pub client_mount: String,
    /// Address the client and the readiness probe use to reach the database.
    pub db_host: String,
    pub db_port: u16,
    /// Artifact that is the database server binary.
    pub server_artifact: String,
}

impl Default for SandboxLayout {
    fn default() -> Self {
        Self {
            db_mount: "/mnt/redis/".to_string(),
            client_mount: "/mnt/client/".to_string(),
            db_host: "localhost".to_string(),
            db_port: 6379,
            server_artifact: rbs_model::DEFAULT_ARTIFACT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory holding the test-suite definitions, re-read for every work item.
    pub test_suites_dir: PathBuf,
    /// Parent directory of the per-run temporary directories.
    pub work_root: PathBuf,
    /// Size of the CPU pool runs are carved from.
    pub cpu_count: usize,
    pub layout: SandboxLayout,
    /// Label of the deployment in result file names and metrics.
    pub deployment_type: String,
    /// Claim entries pending on other consumers for at least this long.
    /// `None` disables recovery of entries from crashed consumers.
    pub claim_min_idle: Option<Duration>,
    /// Pause after a failed queue read.
    pub read_retry_delay: Duration,
    /// Benchmarks shorter than this are reported as possibly unstable.
    pub min_stable_duration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            test_suites_dir: PathBuf::from("test-suites"),
            work_root: default_work_root(),
            cpu_count: host_cpu_count(),
            layout: SandboxLayout::default(),
            deployment_type: "oss-standalone".to_string(),
            claim_min_idle: None,
            read_retry_delay: Duration::from_secs(1),
            min_stable_duration: Duration::from_secs(10),
        }
    }
}

/// Logical CPUs of this host.
pub fn host_cpu_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// `$HOME`, or the system temp directory when unset.
pub fn default_work_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_defaults() {
        let layout = SandboxLayout::default();
        assert_eq!(layout.db_mount, "/mnt/redis/");
        assert_eq!(layout.client_mount, "/mnt/client/");
        assert_eq!(layout.db_port, 6379);
        assert_eq!(layout.server_artifact, "redis-server");
    }

    #[test]
    fn coordinator_defaults() {
        let cfg = CoordinatorConfig::default();
        assert!(cfg.cpu_count >= 1);
        assert_eq!(cfg.deployment_type, "oss-standalone");
        assert!(cfg.claim_min_idle.is_none());
        assert_eq!(cfg.min_stable_duration, Duration::from_secs(10));
    }
}
