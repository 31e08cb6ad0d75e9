use crate::error::{BridgeError, BridgeResult};
use crate::types::ExecutionStatus;

/// Broker list used when neither the caller nor the process environment supplies one
pub const FALLBACK_BROKERS: &str = "localhost:29092";

/// Resolved, non-empty list of `host:port` bootstrap brokers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerList(Vec<String>);

impl BrokerList {
    /// Resolves a comma-separated broker list.
    ///
    /// The explicit value wins when non-blank, then the process-wide default,
    /// then [`FALLBACK_BROKERS`]. Entries are trimmed and blanks dropped.
    pub fn resolve(explicit: &str, process_default: &str) -> BridgeResult<Self> {
        let raw = [explicit, process_default, FALLBACK_BROKERS]
            .into_iter()
            .find(|candidate| !candidate.trim().is_empty())
            .unwrap_or(FALLBACK_BROKERS);

        Self::parse(raw)
    }

    pub fn parse(raw: &str) -> BridgeResult<Self> {
        let brokers: Vec<String> = raw
            .split(',')
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();

        if brokers.is_empty() {
            return Err(BridgeError::Configuration(
                "no Kafka brokers configured".to_string(),
            ));
        }

        Ok(Self(brokers))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Comma-joined form expected by `bootstrap.servers`
    pub fn bootstrap_servers(&self) -> String {
        self.0.join(",")
    }
}

/// Settings for one inbound subscription
#[derive(Debug, Clone)]
pub struct InboundSettings {
    pub brokers: BrokerList,
    pub topic: String,
    pub group_id: String,
    pub from_beginning: bool,
    pub event_filter: Option<String>,
    pub workflow_filter: Option<String>,
    pub parse_json: bool,
}

impl InboundSettings {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.topic.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "inbound topic is required".to_string(),
            ));
        }
        if self.group_id.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "consumer group id is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings shared by every item of one outbound send
#[derive(Debug, Clone)]
pub struct OutboundSettings {
    pub brokers: BrokerList,
    pub topic: String,
    /// One status for the whole batch
    pub status: ExecutionStatus,
}

impl OutboundSettings {
    pub fn validate(&self) -> BridgeResult<()> {
        if self.topic.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "outbound topic is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Treats blank strings as "not set"
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
