use anyhow::Result;
use async_trait::async_trait;
use bridge_domain::{BrokerList, InboundEnvelope};
use bytes::Bytes;

/// Trait for subscription operations
/// Abstracts the poll/commit/seek calls the consumer loop needs from a Kafka consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message on any assigned partition
    async fn next_message(&self) -> Result<InboundEnvelope>;

    /// Durably commit `next_offset` (the next position to read) for one partition
    async fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()>;

    /// Move the partition's fetch position back so `offset` is read again on the next poll
    async fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<()>;

    /// Leave the consumer group
    async fn disconnect(&self) -> Result<()>;
}

/// Trait for opening short-lived producer connections
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProducerConnector: Send + Sync {
    async fn connect(&self, brokers: &BrokerList) -> Result<Box<dyn BatchSender>>;
}

/// Trait for one producer connection
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Send all payloads to `topic` in one call and wait for broker acknowledgment
    async fn send_batch(&self, topic: &str, payloads: Vec<Bytes>) -> Result<()>;

    /// Flush and close the connection
    async fn disconnect(&self) -> Result<()>;
}
