use crate::client::KafkaClient;
use crate::consumer::KafkaConsumer;
use crate::inbound_processor::create_inbound_processor;
use crate::traits::MessageSource;
use bridge_domain::{InboundBridgeService, InboundSettings, WorkflowEngine};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Long-running trigger that feeds one Kafka subscription into the workflow engine
pub struct InboundBridge {
    consumer: KafkaConsumer,
    topic: String,
}

impl InboundBridge {
    pub fn new(
        client: &KafkaClient,
        settings: &InboundSettings,
        engine: Arc<dyn WorkflowEngine>,
    ) -> anyhow::Result<Self> {
        settings.validate()?;

        info!(
            topic = %settings.topic,
            group_id = %settings.group_id,
            "Initializing inbound bridge"
        );

        let source = client.subscribe(settings)?;
        Ok(Self::with_source(source, settings, engine))
    }

    /// Build the bridge over an existing subscription
    pub fn with_source(
        source: Arc<dyn MessageSource>,
        settings: &InboundSettings,
        engine: Arc<dyn WorkflowEngine>,
    ) -> Self {
        let service = Arc::new(InboundBridgeService::from_settings(engine, settings));
        let consumer = KafkaConsumer::new(source, create_inbound_processor(service));

        Self {
            consumer,
            topic: settings.topic.clone(),
        }
    }

    /// Manual test runs produce nothing; messages only arrive through the subscription
    pub fn manual_trigger(&self) {
        info!(topic = %self.topic, "Manual trigger ignored, waiting for Kafka messages");
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(ctx).await
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
    {
        move |ctx| Box::pin(async move { self.run(ctx).await })
    }
}
