//! Redis-backed adapters for the coordinator: the build-events stream
//! consumer, the database readiness probe and the time-series results sink.

mod error;
pub use error::StreamError;

mod config;
pub use config::{ServerConfig, StreamConfig, consumer_name};

mod queue;
pub use queue::RedisStreamQueue;

mod probe;
pub use probe::{PingConfig, RedisPing};

mod timeseries;
pub use timeseries::{RedisTimeSeriesSink, TimeSeriesConfig};
