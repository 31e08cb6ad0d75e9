mod config;
mod engine;
mod telemetry;

use bridge_domain::{non_blank, OutboundBridgeService, WorkflowEngine};
use bridge_kafka::{InboundBridge, KafkaClient, KafkaResultProducer};
use bridge_runner::Runner;
use config::{EngineKind, ServiceConfig};
use engine::{EchoWorkflowEngine, ResultRelay, WebhookWorkflowEngine};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{init_telemetry, LogFormat};
use tracing::{debug, error, info};

const CLIENT_ID: &str = "workflow-bridge";

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let log_format = match LogFormat::parse(&config.log_format) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Invalid log format: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = init_telemetry(&config.log_level, log_format) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(engine = %config.engine, "Starting workflow bridge");
    debug!("Configuration: {:?}", config);

    let inbound_bridge = match build_inbound_bridge(&config) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to initialize inbound bridge: {:#}", e);
            std::process::exit(1);
        }
    };

    let outcome = Runner::new()
        .with_named_process("inbound_bridge", inbound_bridge.into_runner_process())
        .with_closer(|| async move {
            info!("Bridge stopped, offsets of unfinished messages were left uncommitted");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;

    std::process::exit(outcome.exit_code());
}

fn build_inbound_bridge(config: &ServiceConfig) -> anyhow::Result<InboundBridge> {
    let inbound_settings = config.inbound_settings()?;
    let outbound_settings = config.outbound_settings()?;
    let client = KafkaClient::new(CLIENT_ID);

    let producer = KafkaResultProducer::new(client.create_producer_connector());
    let relay = ResultRelay::new(
        OutboundBridgeService::new(Arc::new(producer)),
        outbound_settings,
        non_blank(Some(config.outbound_event.clone())),
    );

    let workflow_id = non_blank(Some(config.workflow_id.clone()));
    let engine: Arc<dyn WorkflowEngine> = match config.engine_kind()? {
        EngineKind::Echo => Arc::new(EchoWorkflowEngine::new(relay, workflow_id)),
        EngineKind::Webhook { url } => {
            info!(url = %url, "Using webhook workflow engine");
            Arc::new(WebhookWorkflowEngine::new(
                url,
                Duration::from_secs(config.engine_timeout_secs),
                relay,
                workflow_id,
            )?)
        }
    };

    Ok(InboundBridge::new(&client, &inbound_settings, engine)?)
}
