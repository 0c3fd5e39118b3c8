use rbs_core::QueueError;
use redis::RedisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("invalid entry id {0:?}")]
    InvalidEntryId(String),
    #[error("field {field} is not binary: {reason}")]
    InvalidField { field: String, reason: String },
}

impl From<StreamError> for QueueError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Redis(e) => QueueError::Backend(e.to_string()),
            other => QueueError::Malformed(other.to_string()),
        }
    }
}
