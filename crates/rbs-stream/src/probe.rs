use std::time::Duration;

use async_trait::async_trait;
use rbs_core::{ProbeError, ReadinessProbe};
use redis::{Client, RedisError};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::config::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    pub attempts: u32,
    /// Pause between failed attempts.
    pub interval: Duration,
    /// Bound on a single connect + `PING`.
    pub timeout: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Readiness of the database-under-test, checked with `PING` over TCP.
#[derive(Debug, Clone, Default)]
pub struct RedisPing {
    cfg: PingConfig,
}

impl RedisPing {
    pub fn new(cfg: PingConfig) -> Self {
        Self { cfg }
    }

    async fn ping_once(&self, server: &ServerConfig) -> Result<(), String> {
        let attempt = async {
            let client = Client::open(server.connection_info())?;
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<(), RedisError>(())
        };
        match timeout(self.cfg.timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no reply within {:?}", self.cfg.timeout)),
        }
    }
}

#[async_trait]
impl ReadinessProbe for RedisPing {
    async fn wait_ready(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let server = ServerConfig::new(host, port);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.cfg.attempts {
            match self.ping_once(&server).await {
                Ok(()) => {
                    info!(
                        target: "rbs.stream.probe",
                        addr = %server.addr(),
                        attempt,
                        "database is ready"
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        target: "rbs.stream.probe",
                        addr = %server.addr(),
                        attempt,
                        error = %e,
                        "database not ready yet"
                    );
                    last_error = e;
                }
            }
            if attempt < self.cfg.attempts {
                sleep(self.cfg.interval).await;
            }
        }
        Err(ProbeError::NotReady {
            addr: server.addr(),
            attempts: self.cfg.attempts,
            last_error,
        })
    }

    async fn shutdown(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let server = ServerConfig::new(host, port);
        let request = async {
            let client = Client::open(server.connection_info())?;
            let mut conn = client.get_multiplexed_async_connection().await?;
            let reply: Result<redis::Value, RedisError> =
                redis::cmd("SHUTDOWN").arg("NOSAVE").query_async(&mut conn).await;
            reply
        };
        match timeout(self.cfg.timeout, request).await {
            Ok(Ok(_)) => Ok(()),
            // The server drops the connection instead of replying.
            Ok(Err(e)) if e.is_connection_dropped() || e.is_io_error() => {
                debug!(target: "rbs.stream.probe", addr = %server.addr(), "database shut down");
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::Shutdown(e.to_string())),
            Err(_) => Err(ProbeError::Shutdown(format!(
                "no reply within {:?}",
                self.cfg.timeout
            ))),
        }
    }
}
