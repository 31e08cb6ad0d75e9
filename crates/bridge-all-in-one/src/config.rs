use bridge_domain::{
    non_blank, BridgeResult, BrokerList, ExecutionStatus, InboundSettings, OutboundSettings,
    CHAT_MESSAGE_INPUT, CHAT_MESSAGE_RESPONSE, FALLBACK_BROKERS,
};
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // Kafka configuration
    /// Comma-separated brokers used by both directions unless overridden
    #[serde(default = "default_kafka_brokers")]
    pub kafka_brokers: String,

    /// Broker override for the inbound subscription
    #[serde(default)]
    pub inbound_brokers: String,

    /// Broker override for the outbound producer
    #[serde(default)]
    pub outbound_brokers: String,

    // Inbound
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,

    #[serde(default = "default_inbound_group_id")]
    pub inbound_group_id: String,

    /// Start from the earliest offset when the group has no committed position
    #[serde(default)]
    pub inbound_from_beginning: bool,

    /// Only deliver messages whose `event` equals this value; empty disables
    #[serde(default = "default_inbound_event_filter")]
    pub inbound_event_filter: String,

    /// Only deliver messages whose `workflowId` equals this value; empty disables
    #[serde(default)]
    pub inbound_workflow_filter: String,

    /// Decode bodies as JSON; otherwise deliver them as `{ "data": "<body>" }`
    #[serde(default = "default_true")]
    pub inbound_parse_json: bool,

    // Outbound
    #[serde(default = "default_outbound_topic")]
    pub outbound_topic: String,

    /// Status reported on every published result (success, error, running, waiting, canceled)
    #[serde(default = "default_outbound_status")]
    pub outbound_status: String,

    #[serde(default = "default_outbound_event")]
    pub outbound_event: String,

    // Engine
    /// Workflow engine adapter (echo, webhook)
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default)]
    pub engine_webhook_url: String,

    /// Timeout for a single webhook call
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,

    /// Id of the workflow this deployment drives
    #[serde(default)]
    pub workflow_id: String,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Which engine adapter handles triggered batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    Echo,
    Webhook { url: String },
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_kafka_brokers() -> String {
    FALLBACK_BROKERS.to_string()
}

fn default_inbound_topic() -> String {
    "botamin.n8n.input".to_string()
}

fn default_inbound_group_id() -> String {
    "n8n-botamin-trigger".to_string()
}

fn default_inbound_event_filter() -> String {
    CHAT_MESSAGE_INPUT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_outbound_topic() -> String {
    "botamin.n8n.output".to_string()
}

fn default_outbound_status() -> String {
    "success".to_string()
}

fn default_outbound_event() -> String {
    CHAT_MESSAGE_RESPONSE.to_string()
}

fn default_engine() -> String {
    "echo".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("BRIDGE"))
            .build()?
            .try_deserialize()
    }

    pub fn inbound_settings(&self) -> BridgeResult<InboundSettings> {
        let settings = InboundSettings {
            brokers: BrokerList::resolve(&self.inbound_brokers, &self.kafka_brokers)?,
            topic: self.inbound_topic.trim().to_string(),
            group_id: self.inbound_group_id.trim().to_string(),
            from_beginning: self.inbound_from_beginning,
            event_filter: non_blank(Some(self.inbound_event_filter.clone())),
            workflow_filter: non_blank(Some(self.inbound_workflow_filter.clone())),
            parse_json: self.inbound_parse_json,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn outbound_settings(&self) -> BridgeResult<OutboundSettings> {
        let settings = OutboundSettings {
            brokers: BrokerList::resolve(&self.outbound_brokers, &self.kafka_brokers)?,
            topic: self.outbound_topic.trim().to_string(),
            status: self.outbound_status.parse::<ExecutionStatus>()?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn engine_kind(&self) -> anyhow::Result<EngineKind> {
        match self.engine.trim() {
            "echo" => Ok(EngineKind::Echo),
            "webhook" => match non_blank(Some(self.engine_webhook_url.clone())) {
                Some(url) => Ok(EngineKind::Webhook { url }),
                None => anyhow::bail!("BRIDGE_ENGINE_WEBHOOK_URL is required for the webhook engine"),
            },
            other => anyhow::bail!("unknown engine: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "BRIDGE_LOG_LEVEL",
        "BRIDGE_KAFKA_BROKERS",
        "BRIDGE_INBOUND_BROKERS",
        "BRIDGE_OUTBOUND_BROKERS",
        "BRIDGE_INBOUND_EVENT_FILTER",
        "BRIDGE_OUTBOUND_STATUS",
        "BRIDGE_ENGINE",
        "BRIDGE_ENGINE_WEBHOOK_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.inbound_topic, "botamin.n8n.input");
        assert_eq!(config.inbound_group_id, "n8n-botamin-trigger");
        assert_eq!(config.outbound_topic, "botamin.n8n.output");
        assert!(config.inbound_parse_json);
        assert!(!config.inbound_from_beginning);

        let inbound = config.inbound_settings().unwrap();
        assert_eq!(inbound.brokers.bootstrap_servers(), "localhost:29092");
        assert_eq!(inbound.event_filter.as_deref(), Some("ChatMessageInput"));
        assert_eq!(inbound.workflow_filter, None);
        assert_eq!(config.engine_kind().unwrap(), EngineKind::Echo);
    }

    #[test]
    fn test_direction_brokers_override_process_default() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("BRIDGE_KAFKA_BROKERS", "shared:9092");
        std::env::set_var("BRIDGE_OUTBOUND_BROKERS", " out-1:9092 , ,out-2:9092 ");

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(
            config.inbound_settings().unwrap().brokers.bootstrap_servers(),
            "shared:9092"
        );
        assert_eq!(
            config.outbound_settings().unwrap().brokers.as_slice(),
            &["out-1:9092".to_string(), "out-2:9092".to_string()]
        );

        clear_env();
    }

    #[test]
    fn test_empty_event_filter_disables_filtering() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("BRIDGE_INBOUND_EVENT_FILTER", "");

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.inbound_settings().unwrap().event_filter, None);

        clear_env();
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("BRIDGE_OUTBOUND_STATUS", "finished");

        let config = ServiceConfig::from_env().unwrap();

        assert!(config.outbound_settings().is_err());

        clear_env();
    }

    #[test]
    fn test_webhook_engine_requires_url() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("BRIDGE_ENGINE", "webhook");

        let config = ServiceConfig::from_env().unwrap();
        assert!(config.engine_kind().is_err());

        std::env::set_var("BRIDGE_ENGINE_WEBHOOK_URL", "http://engine:5678/webhook/bridge");
        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(
            config.engine_kind().unwrap(),
            EngineKind::Webhook {
                url: "http://engine:5678/webhook/bridge".to_string()
            }
        );

        clear_env();
    }
}
