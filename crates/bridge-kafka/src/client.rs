use crate::traits::{BatchSender, MessageSource, ProducerConnector};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bridge_domain::{BrokerList, InboundEnvelope, InboundSettings};
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds Kafka consumers and producer connectors for one client id
#[derive(Debug, Clone)]
pub struct KafkaClient {
    client_id: String,
}

impl KafkaClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn consumer_config(&self, settings: &InboundSettings) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", settings.brokers.bootstrap_servers())
            .set("client.id", &self.client_id)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set(
                "auto.offset.reset",
                if settings.from_beginning {
                    "earliest"
                } else {
                    "latest"
                },
            );
        config
    }

    /// Connect to the brokers and subscribe to the settings' topic
    pub fn subscribe(&self, settings: &InboundSettings) -> Result<Arc<dyn MessageSource>> {
        info!(
            brokers = %settings.brokers.bootstrap_servers(),
            topic = %settings.topic,
            group_id = %settings.group_id,
            from_beginning = settings.from_beginning,
            "Subscribing to Kafka topic"
        );

        let consumer: StreamConsumer = self
            .consumer_config(settings)
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[settings.topic.as_str()])
            .context("Failed to subscribe to topic")?;

        info!(topic = %settings.topic, "Successfully subscribed");
        Ok(Arc::new(KafkaMessageSource {
            consumer: Arc::new(consumer),
        }))
    }

    /// Create a ProducerConnector trait object from this client
    pub fn create_producer_connector(&self) -> Arc<dyn ProducerConnector> {
        Arc::new(KafkaProducerConnector {
            client_id: self.client_id.clone(),
        })
    }
}

/// Concrete implementation of MessageSource using an rdkafka StreamConsumer
pub struct KafkaMessageSource {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn next_message(&self) -> Result<InboundEnvelope> {
        let message = self
            .consumer
            .recv()
            .await
            .context("Failed to receive message")?;

        Ok(InboundEnvelope {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(|p| p.to_vec()),
        })
    }

    async fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(topic, partition, Offset::Offset(next_offset))
            .context("Invalid commit offset")?;

        // Synchronous commit blocks the calling thread until the broker confirms
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .context("Commit task failed")?
            .context("Failed to commit offset")?;

        Ok(())
    }

    async fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);
        let topic = topic.to_string();
        tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
        })
        .await
        .context("Seek task failed")?
        .context("Failed to seek partition")?;

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Leaving consumer group");
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Concrete implementation of ProducerConnector using rdkafka FutureProducer
pub struct KafkaProducerConnector {
    client_id: String,
}

#[async_trait]
impl ProducerConnector for KafkaProducerConnector {
    async fn connect(&self, brokers: &BrokerList) -> Result<Box<dyn BatchSender>> {
        debug!(brokers = %brokers.bootstrap_servers(), "Connecting Kafka producer");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.bootstrap_servers())
            .set("client.id", &self.client_id)
            .set(
                "message.timeout.ms",
                DELIVERY_TIMEOUT.as_millis().to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Box::new(KafkaBatchSender { producer }))
    }
}

/// Concrete implementation of BatchSender using rdkafka FutureProducer
pub struct KafkaBatchSender {
    producer: FutureProducer,
}

#[async_trait]
impl BatchSender for KafkaBatchSender {
    #[instrument(skip(self, payloads), fields(topic = %topic, message_count = payloads.len()))]
    async fn send_batch(&self, topic: &str, payloads: Vec<Bytes>) -> Result<()> {
        // Enqueue in order first, then wait for every delivery report
        let mut deliveries = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(payload.as_ref());
            let delivery = self
                .producer
                .send_result(record)
                .map_err(|(e, _)| anyhow!(e).context("Failed to enqueue message"))?;
            deliveries.push(delivery);
        }

        for delivery in futures::future::join_all(deliveries).await {
            match delivery {
                Ok(Ok(_)) => {}
                Ok(Err((e, _))) => {
                    return Err(anyhow!(e).context("Broker rejected message"));
                }
                Err(_) => bail!("Delivery report was dropped before completion"),
            }
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .context("Flush task failed")?
            .context("Failed to flush producer")?;
        Ok(())
    }
}
