//! Run summaries as RedisTimeSeries samples.
//!
//! Keys live under `ci.benchmarks.redislabs/<env>/<org>/<repo>`:
//! `:testcases` (set of test names), `:total_success` / `:total_failures`
//! (run counters) and `:<test>:benchmark_duration` (seconds, successful runs only).
use async_trait::async_trait;
use rbs_core::{MetricsError, MetricsSink, RunStatus, RunSummary};
use redis::{Client, aio::MultiplexedConnection};
use tracing::debug;

use crate::config::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesConfig {
    pub server: ServerConfig,
    pub github_org: String,
    pub github_repo: String,
    pub triggering_env: String,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            github_org: "redis".to_string(),
            github_repo: "redis".to_string(),
            triggering_env: "ci".to_string(),
        }
    }
}

impl TimeSeriesConfig {
    pub fn key_prefix(&self) -> String {
        format!(
            "ci.benchmarks.redislabs/{}/{}/{}",
            self.triggering_env, self.github_org, self.github_repo
        )
    }
}

pub struct RedisTimeSeriesSink {
    cfg: TimeSeriesConfig,
    conn: MultiplexedConnection,
}

impl RedisTimeSeriesSink {
    pub async fn connect(cfg: TimeSeriesConfig) -> Result<Self, redis::RedisError> {
        let client = Client::open(cfg.server.connection_info())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { cfg, conn })
    }
}

#[async_trait]
impl MetricsSink for RedisTimeSeriesSink {
    async fn push(&self, summary: &RunSummary) -> Result<(), MetricsError> {
        let mut pipe = redis::pipe();
        for command in commands(&self.cfg, summary) {
            let mut cmd = redis::cmd(&command[0]);
            for arg in &command[1..] {
                cmd.arg(arg);
            }
            pipe.add_command(cmd).ignore();
        }

        let mut conn = self.conn.clone();
        let pushed: Result<(), redis::RedisError> = pipe.query_async(&mut conn).await;
        pushed.map_err(|e| MetricsError::Store(e.to_string()))?;
        debug!(
            target: "rbs.stream.timeseries",
            prefix = %self.cfg.key_prefix(),
            test = %summary.test_name,
            "run summary stored"
        );
        Ok(())
    }
}

/// Commands recording one run, in execution order.
fn commands(cfg: &TimeSeriesConfig, summary: &RunSummary) -> Vec<Vec<String>> {
    let prefix = cfg.key_prefix();
    let timestamp = summary.started_at_ms.to_string();
    let mut labels = vec![
        "LABELS".to_string(),
        "github_org".to_string(),
        cfg.github_org.clone(),
        "github_repo".to_string(),
        cfg.github_repo.clone(),
        "deployment_type".to_string(),
        summary.deployment_type.clone(),
        "triggering_env".to_string(),
        cfg.triggering_env.clone(),
    ];

    let counter = match summary.status {
        RunStatus::Succeeded => "total_success",
        RunStatus::Failed => "total_failures",
    };
    let mut out = vec![
        vec!["SADD".to_string(), format!("{prefix}:testcases"), summary.test_name.clone()],
        [
            vec![
                "TS.INCRBY".to_string(),
                format!("{prefix}:{counter}"),
                "1".to_string(),
                "TIMESTAMP".to_string(),
                timestamp.clone(),
            ],
            labels.clone(),
        ]
        .concat(),
    ];

    if let (RunStatus::Succeeded, Some(duration)) = (summary.status, summary.benchmark_duration) {
        labels.push("test_name".to_string());
        labels.push(summary.test_name.clone());
        out.push(
            [
                vec![
                    "TS.ADD".to_string(),
                    format!("{prefix}:{}:benchmark_duration", summary.test_name),
                    timestamp,
                    duration.as_secs_f64().to_string(),
                ],
                labels,
            ]
            .concat(),
        );
    }
    out
}
