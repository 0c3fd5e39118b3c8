use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use rbs_core::{Delivery, DeliveryBody, QueueError, WorkQueue};
use rbs_model::{ConsumerCursor, EntryFields, EntryId};
use redis::{
    Client, Value,
    aio::MultiplexedConnection,
    streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply},
};
use tracing::{debug, info, trace, warn};

use crate::{config::StreamConfig, error::StreamError};

/// Consumer-group reader of the build-events stream.
///
/// Reads block without timeout on a dedicated multiplexed connection; the
/// coordinator issues one command at a time, so acknowledgements never queue
/// behind a pending read.
pub struct RedisStreamQueue {
    cfg: StreamConfig,
    conn: MultiplexedConnection,
}

impl RedisStreamQueue {
    /// Connect and check the server answers `PING`.
    pub async fn connect(cfg: StreamConfig) -> Result<Self, StreamError> {
        let client = Client::open(cfg.server.connection_info())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(
            target: "rbs.stream.queue",
            addr = %cfg.server.addr(),
            reply = %pong,
            "connected to build-events server"
        );
        Ok(Self { cfg, conn })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    /// Create the consumer group at the stream tail, creating the stream if
    /// needed. An existing group is left as is.
    pub async fn ensure_group(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let created: Result<Value, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.cfg.stream_key)
            .arg(&self.cfg.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(_) => {
                info!(
                    target: "rbs.stream.queue",
                    stream = %self.cfg.stream_key,
                    group = %self.cfg.group,
                    "consumer group created"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                info!(
                    target: "rbs.stream.queue",
                    stream = %self.cfg.stream_key,
                    group = %self.cfg.group,
                    "consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_entry(&self, cursor: &ConsumerCursor) -> Result<Option<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        trace!(
            target: "rbs.stream.queue",
            cursor = %cursor,
            consumer = %self.cfg.consumer,
            "XREADGROUP"
        );
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.cfg.group)
            .arg(&self.cfg.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(0)
            .arg("STREAMS")
            .arg(&self.cfg.stream_key)
            .arg(cursor.as_arg())
            .query_async(&mut conn)
            .await?;

        let entry = reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next());
        entry.map(delivery_from).transpose()
    }

    async fn claim_one(&self, min_idle: Duration) -> Result<Option<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let idle_ms = min_idle.as_millis().to_string();

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.cfg.stream_key)
            .arg(&self.cfg.group)
            .arg("IDLE")
            .arg(&idle_ms)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(&mut conn)
            .await?;
        let Some(stale) = pending.ids.into_iter().next() else {
            return Ok(None);
        };
        debug!(
            target: "rbs.stream.queue",
            id = %stale.id,
            owner = %stale.consumer,
            idle_ms = stale.last_delivered_ms,
            deliveries = stale.times_delivered,
            "stale pending entry"
        );

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.cfg.stream_key)
            .arg(&self.cfg.group)
            .arg(&self.cfg.consumer)
            .arg(&idle_ms)
            .arg(&stale.id)
            .query_async(&mut conn)
            .await?;
        // Another consumer may have claimed it in between.
        claimed.ids.into_iter().next().map(delivery_from).transpose()
    }
}

#[async_trait]
impl WorkQueue for RedisStreamQueue {
    async fn read(&self, cursor: &ConsumerCursor) -> Result<Option<Delivery>, QueueError> {
        Ok(self.read_entry(cursor).await?)
    }

    async fn ack(&self, id: EntryId) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let acked: i64 = redis::cmd("XACK")
            .arg(&self.cfg.stream_key)
            .arg(&self.cfg.group)
            .arg(id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(StreamError::from)?;
        debug!(target: "rbs.stream.queue", %id, acked, "XACK");
        Ok(())
    }

    async fn claim_stale(&self, min_idle: Duration) -> Result<Option<Delivery>, QueueError> {
        Ok(self.claim_one(min_idle).await?)
    }
}

/// An entry whose fields cannot be read is still delivered, so the
/// coordinator can acknowledge it; only an unparsable id is an error.
fn delivery_from(entry: StreamId) -> Result<Delivery, StreamError> {
    let id = entry
        .id
        .parse::<EntryId>()
        .map_err(|_| StreamError::InvalidEntryId(entry.id.clone()))?;
    match decode_fields(entry.map) {
        Ok(fields) => Ok(Delivery::new(id, fields)),
        Err(e) => {
            warn!(target: "rbs.stream.queue", %id, error = %e, "entry fields unreadable");
            Ok(Delivery::unreadable(id, e.to_string()))
        }
    }
}

/// Field map of an entry as raw bytes.
fn decode_fields(map: HashMap<String, Value>) -> Result<EntryFields, StreamError> {
    let mut fields = EntryFields::with_capacity(map.len());
    for (name, value) in map {
        let bytes: Vec<u8> = redis::from_redis_value(&value).map_err(|e| StreamError::InvalidField {
            field: name.clone(),
            reason: e.to_string(),
        })?;
        fields.insert(name, bytes);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_id(id: &str, pairs: &[(&str, Value)]) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn entry_becomes_delivery_with_binary_fields() {
        let entry = stream_id(
            "1622800000000-3",
            &[
                ("git_hash", Value::BulkString(b"abc123".to_vec())),
                ("redis-server", Value::BulkString(vec![0x7f, b'E', b'L', b'F', 0xff])),
            ],
        );

        let delivery = delivery_from(entry).unwrap();

        assert_eq!(delivery.id, EntryId::new(1622800000000, 3));
        let DeliveryBody::Fields(fields) = delivery.body else {
            panic!("expected readable fields");
        };
        assert_eq!(fields["git_hash"], b"abc123");
        assert_eq!(fields["redis-server"], vec![0x7f, b'E', b'L', b'F', 0xff]);
    }

    #[test]
    fn bad_entry_id_is_rejected() {
        let entry = stream_id("not-an-id", &[]);
        assert!(matches!(delivery_from(entry), Err(StreamError::InvalidEntryId(_))));
    }

    #[test]
    fn non_binary_field_is_delivered_as_unreadable() {
        let nested = Value::Array(vec![Value::Int(1), Value::Array(vec![])]);
        let entry = stream_id("1-0", &[("git_hash", nested)]);

        let delivery = delivery_from(entry).unwrap();

        assert_eq!(delivery.id, EntryId::new(1, 0));
        assert!(matches!(
            delivery.body,
            DeliveryBody::Unreadable(ref reason) if reason.contains("git_hash")
        ));
    }

    #[test]
    fn malformed_entries_map_to_queue_errors() {
        let err: QueueError = StreamError::InvalidEntryId("x".into()).into();
        assert!(matches!(err, QueueError::Malformed(_)));
    }
}
