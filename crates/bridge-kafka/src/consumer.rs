use crate::traits::MessageSource;
use anyhow::Result;
use bridge_domain::InboundEnvelope;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the consumer loop should do with a message once it has been processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Handled; commit `offset + 1` for the message's partition
    Commit,
    /// Nothing to do and nothing to commit
    Skip,
    /// Not handled; leave the offset alone and read the message again on the next poll
    Redeliver(Option<String>),
}

/// Type alias for the message processor function
/// Takes one decoded-from-the-wire message and decides its commit fate
pub type MessageProcessor =
    Box<dyn Fn(InboundEnvelope) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Kafka subscription loop with manual, per-message offset commits
///
/// Messages are handled one at a time in the order the source yields them, so
/// a partition's next message is never processed before the previous one is
/// committed or rewound.
pub struct KafkaConsumer {
    source: Arc<dyn MessageSource>,
    processor: MessageProcessor,
    retry_delay: Duration,
}

impl KafkaConsumer {
    pub fn new(source: Arc<dyn MessageSource>, processor: MessageProcessor) -> Self {
        Self {
            source,
            processor,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Delay after a failed poll before polling again
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!("Starting consumer loop");

        while !ctx.is_cancelled() {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                result = self.source.next_message() => {
                    match result {
                        Ok(message) => {
                            let (partition, offset) = (message.partition, message.offset);
                            tokio::select! {
                                biased;
                                _ = ctx.cancelled() => {
                                    warn!(
                                        partition,
                                        offset,
                                        "Shutdown while processing, message left uncommitted"
                                    );
                                    break;
                                }
                                _ = self.process_message(message) => {}
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Error receiving message");
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
        }

        info!("Received shutdown signal, stopping consumer");
        if let Err(e) = self.source.disconnect().await {
            error!(error = %e, "Failed to disconnect consumer");
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn process_message(&self, message: InboundEnvelope) {
        let topic = message.topic.clone();
        let partition = message.partition;
        let offset = message.offset;
        let next_offset = message.next_offset();

        debug!(topic = %topic, partition, offset, "Received message");

        let processing_result = match (self.processor)(message).await {
            Ok(result) => result,
            Err(e) => {
                // A failing processor means the message was not handled
                error!(error = %e, partition, offset, "Processor returned error");
                ProcessingResult::Redeliver(Some(e.to_string()))
            }
        };

        match processing_result {
            ProcessingResult::Commit => {
                match self.source.commit(&topic, partition, next_offset).await {
                    Ok(()) => debug!(topic = %topic, partition, next_offset, "Committed offset"),
                    Err(e) => error!(
                        error = %e,
                        topic = %topic,
                        partition,
                        next_offset,
                        "Failed to commit offset"
                    ),
                }
            }
            ProcessingResult::Skip => {
                debug!(topic = %topic, partition, offset, "Skipped message");
            }
            ProcessingResult::Redeliver(reason) => {
                match reason {
                    Some(err) => error!(
                        topic = %topic,
                        partition,
                        offset,
                        error = %err,
                        "Message not handled, scheduling redelivery"
                    ),
                    None => warn!(topic = %topic, partition, offset, "Scheduling redelivery"),
                }

                if let Err(e) = self.source.rewind(&topic, partition, offset).await {
                    error!(
                        error = %e,
                        topic = %topic,
                        partition,
                        offset,
                        "Failed to rewind partition"
                    );
                }
            }
        }
    }
}
