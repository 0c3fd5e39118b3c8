use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("database at {addr} not ready after {attempts} attempts: {last_error}")]
    NotReady {
        addr: String,
        attempts: u32,
        last_error: String,
    },
    #[error("database shutdown request failed: {0}")]
    Shutdown(String),
}

/// Liveness check of the database-under-test, performed out-of-band by the
/// coordinator since sandbox start does not wait for the service.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn wait_ready(&self, host: &str, port: u16) -> Result<(), ProbeError>;

    /// Ask the database to exit without persisting data.
    async fn shutdown(&self, host: &str, port: u16) -> Result<(), ProbeError>;
}
