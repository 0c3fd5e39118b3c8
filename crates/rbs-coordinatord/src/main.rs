use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rbs_core::{Coordinator, CoordinatorConfig, MetricsSink, config::host_cpu_count};
use rbs_exec::DockerCli;
use rbs_model::{ConsumerCursor, TopologyCatalog};
use rbs_observe::{LoggerConfig, LoggerFormat, logger_init};
use rbs_stream::{
    PingConfig, RedisPing, RedisStreamQueue, RedisTimeSeriesSink, ServerConfig, StreamConfig,
    TimeSeriesConfig, consumer_name,
};

#[derive(Parser, Debug)]
#[command(name = "rbs-coordinatord")]
#[command(version)]
#[command(about = "Consumes build events and benchmarks each build in isolated sandboxes")]
struct Args {
    /// How many of this host's CPUs benchmark sandboxes may use
    #[arg(long)]
    cpu_count: Option<usize>,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    logname: Option<PathBuf>,

    /// Log filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: text, json or journald
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: LoggerFormat,

    /// First stream id to read: `>` for new entries only, or an id to replay
    /// this consumer's pending entries after it
    #[arg(long, default_value = ">")]
    consumer_start_id: ConsumerCursor,

    /// Index of this process among the group's consumers
    #[arg(long, default_value = "1")]
    consumer_id: u32,

    /// Folder with the setup variations; topologies are read from its `topologies/` sub-folder
    #[arg(long, env = "SPECS_PATH_SETUPS", default_value = "specs/setups")]
    setups_folder: PathBuf,

    /// Folder with the test-suite definitions
    #[arg(long, env = "SPECS_PATH_TEST_SUITES", default_value = "specs/test-suites")]
    test_suites_folder: PathBuf,

    /// Parent directory of per-run scratch directories (default: $HOME)
    #[arg(long)]
    work_root: Option<PathBuf>,

    /// Recover entries left pending by other consumers for this many seconds
    #[arg(long)]
    claim_min_idle_secs: Option<u64>,

    #[arg(long, env = "GH_REDIS_SERVER_HOST", default_value = "localhost")]
    redis_host: String,

    #[arg(long, env = "GH_REDIS_SERVER_PORT", default_value = "6379")]
    redis_port: u16,

    #[arg(long, env = "GH_REDIS_SERVER_USER")]
    redis_user: Option<String>,

    #[arg(long, env = "GH_REDIS_SERVER_AUTH", hide_env_values = true)]
    redis_pass: Option<String>,

    #[arg(
        long,
        env = "STREAM_KEYNAME_NEW_BUILD_EVENTS",
        default_value = "oss:api:gh/redis/redis/builds"
    )]
    stream_key: String,

    #[arg(
        long,
        env = "STREAM_GH_NEW_BUILD_RUNNERS_CG",
        default_value = "runners-cg:redis/redis/commits"
    )]
    consumer_group: String,

    /// Push run summaries to RedisTimeSeries
    #[arg(long)]
    push_results_redistimeseries: bool,

    #[arg(long, env = "DATASINK_RTS_HOST", default_value = "localhost")]
    datasink_redistimeseries_host: String,

    #[arg(long, env = "DATASINK_RTS_PORT", default_value = "6379")]
    datasink_redistimeseries_port: u16,

    #[arg(long, env = "DATASINK_RTS_USER")]
    datasink_redistimeseries_user: Option<String>,

    #[arg(long, env = "DATASINK_RTS_AUTH", hide_env_values = true)]
    datasink_redistimeseries_pass: Option<String>,

    #[arg(long, env = "TRIGGERING_ENV", default_value = "ci")]
    triggering_env: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log = LoggerConfig {
        format: args.log_format,
        level: args.log_level.clone(),
        file: args.logname.clone(),
        ..Default::default()
    };
    logger_init(&log).context("initializing logger")?;
    if let Some(file) = &args.logname {
        info!(path = %file.display(), "writing log to file");
    }

    let topologies_dir = args.setups_folder.join("topologies");
    let topologies = TopologyCatalog::load_dir(&topologies_dir)
        .with_context(|| format!("loading topologies from {}", topologies_dir.display()))?;
    info!(
        source = ?topologies.source(),
        topologies = ?topologies.names(),
        "topologies loaded"
    );

    let stream = StreamConfig {
        server: ServerConfig {
            host: args.redis_host.clone(),
            port: args.redis_port,
            username: args.redis_user.clone(),
            password: args.redis_pass.clone(),
        },
        stream_key: args.stream_key.clone(),
        consumer: consumer_name(&args.consumer_group, args.consumer_id),
        group: args.consumer_group.clone(),
    };
    info!(
        addr = %stream.server.addr(),
        stream = %stream.stream_key,
        "connecting to build-events server"
    );
    let queue = match RedisStreamQueue::connect(stream).await {
        Ok(queue) => queue,
        Err(e) => {
            error!(
                addr = %format!("{}:{}", args.redis_host, args.redis_port),
                error = %e,
                "unable to connect to the build-events server"
            );
            return Err(e).context("connecting to the build-events server");
        }
    };
    queue.ensure_group().await.context("creating consumer group")?;

    let sink: Option<Arc<dyn MetricsSink>> = if args.push_results_redistimeseries {
        let cfg = TimeSeriesConfig {
            server: ServerConfig {
                host: args.datasink_redistimeseries_host.clone(),
                port: args.datasink_redistimeseries_port,
                username: args.datasink_redistimeseries_user.clone(),
                password: args.datasink_redistimeseries_pass.clone(),
            },
            triggering_env: args.triggering_env.clone(),
            ..Default::default()
        };
        match RedisTimeSeriesSink::connect(cfg).await {
            Ok(sink) => Some(Arc::new(sink) as Arc<dyn MetricsSink>),
            Err(e) => {
                warn!(error = %e, "time-series store unavailable; results will not be pushed");
                None
            }
        }
    } else {
        None
    };

    let mut config = CoordinatorConfig {
        test_suites_dir: args.test_suites_folder.clone(),
        cpu_count: args.cpu_count.unwrap_or_else(host_cpu_count),
        claim_min_idle: args.claim_min_idle_secs.map(Duration::from_secs),
        ..Default::default()
    };
    if let Some(root) = &args.work_root {
        config.work_root = root.clone();
    }
    info!(
        consumer = %queue.config().consumer,
        cpus = config.cpu_count,
        suites = %config.test_suites_dir.display(),
        work_root = %config.work_root.display(),
        "coordinator configured"
    );

    let mut coordinator = Coordinator::new(
        Arc::new(queue),
        Arc::new(DockerCli::new()),
        Arc::new(RedisPing::new(PingConfig::default())),
        sink,
        topologies,
        config,
        args.consumer_start_id,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    coordinator.run(cancel).await;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested; finishing the current run");
    cancel.cancel();
}
