use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Event tag the trigger accepts by default
pub const CHAT_MESSAGE_INPUT: &str = "ChatMessageInput";

/// Result event tag published by default; enables the chat-specific result fields
pub const CHAT_MESSAGE_RESPONSE: &str = "ChatMessageResponse";

/// Domain written to the result envelope when no source carries one
pub const DEFAULT_DOMAIN: &str = "chat";

/// Well-known name under which the engine exposes the trigger's last emitted item
pub const TRIGGER_STAGE_NAME: &str = "Botamin Kafka Trigger";

/// A single message as read from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl InboundEnvelope {
    pub fn is_empty(&self) -> bool {
        self.payload.as_ref().map_or(true, |p| p.is_empty())
    }

    /// Offset to commit once this message is handled: the next position to read
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Outcome of decoding a message body
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Body decoded (or taken verbatim as a string when JSON parsing is off)
    Decoded(Value),
    /// Body could not be decoded; delivered as a `{parseError, raw}` record
    Malformed { parse_error: String, raw: String },
}

/// Identifying fields read from a decoded object
///
/// All fields are optional; anything not listed here stays in the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub event: Option<String>,
    pub workflow_id: Option<String>,
    pub correlation_id: Option<String>,
    pub domain: Option<String>,
    pub domain_entity_id: Option<Value>,
    pub company_id: Option<Value>,
    pub bot_id: Option<Value>,
    pub meta: Map<String, Value>,
}

impl EventFields {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            event: object
                .get("event")
                .and_then(Value::as_str)
                .map(str::to_string),
            workflow_id: object.get("workflowId").and_then(id_string),
            correlation_id: object.get("correlationId").and_then(id_string),
            domain: object.get("domain").and_then(id_string),
            domain_entity_id: object.get("domainEntityId").cloned(),
            company_id: object.get("companyId").cloned(),
            bot_id: object.get("botId").cloned(),
            meta: match object.get("meta") {
                Some(Value::Object(meta)) => meta.clone(),
                _ => Map::new(),
            },
        }
    }
}

/// Renders an identifier-like JSON value as a string.
///
/// Empty strings and nulls count as absent; numbers and booleans are stringified.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Normalized unit handed to the workflow engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationRecord(Map<String, Value>);

impl InvocationRecord {
    /// Objects pass through as-is, anything else is wrapped as `{ "data": value }`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn malformed(parse_error: String, raw: String) -> Self {
        let mut map = Map::new();
        map.insert("parseError".to_string(), Value::String(parse_error));
        map.insert("raw".to_string(), Value::String(raw));
        Self(map)
    }

    pub fn fields(&self) -> EventFields {
        EventFields::from_object(&self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for InvocationRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One item handed to the outbound bridge by the engine (the item's JSON data)
pub type EngineItem = Map<String, Value>;

/// Workflow run status reported on the result envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Success,
    Error,
    Running,
    Waiting,
    Canceled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "success" => Ok(ExecutionStatus::Success),
            "error" => Ok(ExecutionStatus::Error),
            "running" => Ok(ExecutionStatus::Running),
            "waiting" => Ok(ExecutionStatus::Waiting),
            "canceled" => Ok(ExecutionStatus::Canceled),
            other => Err(BridgeError::Configuration(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

/// Chat state transition requested by a chat response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Activate,
    Stop,
    Lead,
    Unlead,
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "activate" => Ok(ChatStatus::Activate),
            "stop" => Ok(ChatStatus::Stop),
            "lead" => Ok(ChatStatus::Lead),
            "unlead" => Ok(ChatStatus::Unlead),
            other => Err(format!("unknown chat status: {other}")),
        }
    }
}

/// The `result` object of a result envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_status: Option<ChatStatus>,
}

impl ResultBody {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.chat_context.is_none() && self.chat_status.is_none()
    }

    /// `None` when no key would be written, so the envelope omits `result` entirely
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Correlated result published on the outbound topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub correlation_id: String,
    pub status: ExecutionStatus,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_entity_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<Value>,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultBody>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Values resolved per item by the engine, typically from per-item expressions
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemParameters {
    pub correlation_id: Option<String>,
    pub execution_id: Option<String>,
    pub response_text: Option<String>,
    pub event: Option<String>,
    pub error: Option<String>,
    /// JSON text or an already-parsed object
    pub chat_context: Option<Value>,
    pub chat_status: Option<String>,
}
