use crate::traits::ProducerConnector;
use async_trait::async_trait;
use bridge_domain::{BridgeError, BridgeResult, BrokerList, ResultEnvelope, ResultEnvelopeProducer};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Kafka producer for ResultEnvelope batches
///
/// Each call opens its own connection, issues exactly one batch send and
/// disconnects. Send failures are not retried here.
pub struct KafkaResultProducer {
    connector: Arc<dyn ProducerConnector>,
}

impl KafkaResultProducer {
    pub fn new(connector: Arc<dyn ProducerConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl ResultEnvelopeProducer for KafkaResultProducer {
    async fn publish_batch(
        &self,
        brokers: &BrokerList,
        topic: &str,
        envelopes: &[ResultEnvelope],
    ) -> BridgeResult<()> {
        if envelopes.is_empty() {
            debug!(topic = %topic, "No result envelopes to publish");
            return Ok(());
        }

        // Serialize everything before any network call
        let payloads = envelopes
            .iter()
            .map(|envelope| serde_json::to_vec(envelope).map(Bytes::from))
            .collect::<Result<Vec<_>, _>>()?;

        let publish_error = |e: anyhow::Error| BridgeError::Publish {
            topic: topic.to_string(),
            reason: format!("{e:#}"),
        };

        let sender = self
            .connector
            .connect(brokers)
            .await
            .map_err(publish_error)?;

        debug!(
            topic = %topic,
            message_count = payloads.len(),
            "Publishing ResultEnvelope batch"
        );

        let sent = sender.send_batch(topic, payloads).await;

        if let Err(e) = sender.disconnect().await {
            warn!(error = %e, topic = %topic, "Failed to disconnect producer");
        }

        sent.map_err(publish_error)?;

        info!(
            topic = %topic,
            message_count = envelopes.len(),
            "Successfully published ResultEnvelope batch"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockBatchSender, MockProducerConnector};
    use bridge_domain::{ExecutionStatus, DEFAULT_DOMAIN};
    use serde_json::{json, Map, Value};

    fn envelope(correlation_id: &str) -> ResultEnvelope {
        ResultEnvelope {
            execution_id: correlation_id.to_string(),
            workflow_id: Some("w1".to_string()),
            correlation_id: correlation_id.to_string(),
            status: ExecutionStatus::Success,
            domain: DEFAULT_DOMAIN.to_string(),
            domain_entity_id: None,
            company_id: None,
            bot_id: None,
            event: "ChatMessageResponse".to_string(),
            result: None,
            meta: Map::new(),
            error: None,
        }
    }

    fn brokers() -> BrokerList {
        BrokerList::parse("localhost:29092").unwrap()
    }

    #[tokio::test]
    async fn test_publish_sends_one_batch_then_disconnects() {
        // Arrange
        let mut sender = MockBatchSender::new();
        sender
            .expect_send_batch()
            .withf(|topic: &str, payloads: &Vec<Bytes>| {
                let first: Value = serde_json::from_slice(&payloads[0]).unwrap();
                topic == "botamin.n8n.output"
                    && payloads.len() == 2
                    && first["correlationId"] == json!("c1")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        sender.expect_disconnect().times(1).returning(|| Ok(()));

        let mut connector = MockProducerConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_| Ok(Box::new(sender) as Box<dyn crate::traits::BatchSender>));

        let producer = KafkaResultProducer::new(Arc::new(connector));

        // Act
        let result = producer
            .publish_batch(
                &brokers(),
                "botamin.n8n.output",
                &[envelope("c1"), envelope("c2")],
            )
            .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_connection() {
        let mut connector = MockProducerConnector::new();
        connector.expect_connect().times(0);

        let producer = KafkaResultProducer::new(Arc::new(connector));
        let result = producer
            .publish_batch(&brokers(), "botamin.n8n.output", &[])
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connection_failure_is_publish_error() {
        let mut connector = MockProducerConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("broker unreachable")));

        let producer = KafkaResultProducer::new(Arc::new(connector));
        let result = producer
            .publish_batch(&brokers(), "botamin.n8n.output", &[envelope("c1")])
            .await;

        match result {
            Err(BridgeError::Publish { topic, reason }) => {
                assert_eq!(topic, "botamin.n8n.output");
                assert!(reason.contains("broker unreachable"));
            }
            other => panic!("expected publish error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_failure_still_disconnects_and_is_not_retried() {
        let mut sender = MockBatchSender::new();
        sender
            .expect_send_batch()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("send rejected")));
        sender.expect_disconnect().times(1).returning(|| Ok(()));

        let mut connector = MockProducerConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_| Ok(Box::new(sender) as Box<dyn crate::traits::BatchSender>));

        let producer = KafkaResultProducer::new(Arc::new(connector));
        let result = producer
            .publish_batch(&brokers(), "botamin.n8n.output", &[envelope("c1")])
            .await;

        assert!(matches!(result, Err(BridgeError::Publish { .. })));
    }
}
