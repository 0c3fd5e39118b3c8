use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("empty sandbox command")]
    EmptyCommand,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code: {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("killed by signal")]
    KilledBySignal,
    #[error("runtime returned no container id")]
    MissingContainerId,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
