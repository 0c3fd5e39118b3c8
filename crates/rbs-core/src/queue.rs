use std::time::Duration;

use async_trait::async_trait;
use rbs_model::{ConsumerCursor, EntryFields, EntryId};
use thiserror::Error;

/// One entry handed to this consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: EntryId,
    pub body: DeliveryBody,
}

/// Field map of a delivered entry, or why it could not be read.
///
/// An unreadable entry is still owned by this consumer and must be
/// acknowledged to leave the pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryBody {
    Fields(EntryFields),
    Unreadable(String),
}

impl Delivery {
    pub fn new(id: EntryId, fields: EntryFields) -> Self {
        Self {
            id,
            body: DeliveryBody::Fields(fields),
        }
    }

    pub fn unreadable(id: EntryId, reason: impl Into<String>) -> Self {
        Self {
            id,
            body: DeliveryBody::Unreadable(reason.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("malformed queue reply: {0}")]
    Malformed(String),
}

/// Durable log consumed under a consumer group (claim → process → acknowledge).
///
/// Implementations are bound to one stream, group and consumer name.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Read at most one entry at `cursor`. With [`ConsumerCursor::New`] this
    /// blocks until an entry arrives; with an explicit id it returns the next
    /// entry of this consumer's pending history, or `None` once exhausted.
    async fn read(&self, cursor: &ConsumerCursor) -> Result<Option<Delivery>, QueueError>;

    /// Mark the entry as processed for the group.
    async fn ack(&self, id: EntryId) -> Result<(), QueueError>;

    /// Take over one entry left pending by any consumer for at least `min_idle`.
    async fn claim_stale(&self, min_idle: Duration) -> Result<Option<Delivery>, QueueError>;
}
