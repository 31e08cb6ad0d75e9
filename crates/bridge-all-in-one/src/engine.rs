use async_trait::async_trait;
use bridge_domain::{
    non_blank, BridgeError, BridgeResult, EngineItem, ExecutionContext, InvocationRecord,
    ItemParameters, OutboundBridgeService, OutboundSettings, WorkflowEngine, TRIGGER_STAGE_NAME,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Engine state for one execution: its id and the batch that triggered it
#[derive(Debug, Clone)]
pub struct TriggerContext {
    execution_id: String,
    workflow_id: Option<String>,
    trigger_output: Option<Map<String, Value>>,
}

impl TriggerContext {
    pub fn new(workflow_id: Option<String>, records: &[InvocationRecord]) -> Self {
        Self {
            execution_id: xid::new().to_string(),
            workflow_id,
            trigger_output: records.last().map(|record| record.as_map().clone()),
        }
    }
}

impl ExecutionContext for TriggerContext {
    fn execution_id(&self) -> Option<String> {
        Some(self.execution_id.clone())
    }

    fn workflow_id(&self) -> Option<String> {
        self.workflow_id.clone()
    }

    fn stage_output(&self, stage_name: &str) -> Option<Map<String, Value>> {
        if stage_name == TRIGGER_STAGE_NAME {
            self.trigger_output.clone()
        } else {
            None
        }
    }
}

/// Hands workflow output to the outbound bridge
///
/// A failed publish is the execution's failure, not the trigger's: it is
/// logged and the inbound message still counts as delivered.
pub struct ResultRelay {
    outbound: OutboundBridgeService,
    settings: OutboundSettings,
    event: Option<String>,
}

impl ResultRelay {
    pub fn new(
        outbound: OutboundBridgeService,
        settings: OutboundSettings,
        event: Option<String>,
    ) -> Self {
        Self {
            outbound,
            settings,
            event,
        }
    }

    async fn relay<F>(&self, items: &[EngineItem], params: F, context: &TriggerContext)
    where
        F: Fn(usize, &EngineItem) -> ItemParameters,
    {
        if items.is_empty() {
            debug!(execution_id = %context.execution_id, "Execution produced no items");
            return;
        }

        let event = self.event.clone();
        let result = self
            .outbound
            .send(
                &self.settings,
                items,
                |index, item| ItemParameters {
                    event: event.clone(),
                    ..params(index, item)
                },
                context,
            )
            .await;

        match result {
            Ok(count) => info!(
                execution_id = %context.execution_id,
                count,
                "Execution results published"
            ),
            Err(e) => error!(
                execution_id = %context.execution_id,
                error = %e,
                "Failed to publish execution results"
            ),
        }
    }
}

fn string_field(item: &EngineItem, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => non_blank(Some(s.clone())),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Echoes every record's `text` (or `message`) back as the response text
pub struct EchoWorkflowEngine {
    relay: ResultRelay,
    workflow_id: Option<String>,
}

impl EchoWorkflowEngine {
    pub fn new(relay: ResultRelay, workflow_id: Option<String>) -> Self {
        Self { relay, workflow_id }
    }
}

#[async_trait]
impl WorkflowEngine for EchoWorkflowEngine {
    async fn trigger(&self, records: Vec<InvocationRecord>) -> BridgeResult<()> {
        let context = TriggerContext::new(self.workflow_id.clone(), &records);
        debug!(
            execution_id = %context.execution_id,
            record_count = records.len(),
            "Echo execution started"
        );

        let items: Vec<EngineItem> = records.into_iter().map(InvocationRecord::into_map).collect();
        self.relay
            .relay(
                &items,
                |_, item| ItemParameters {
                    response_text: string_field(item, "text")
                        .or_else(|| string_field(item, "message")),
                    ..Default::default()
                },
                &context,
            )
            .await;

        Ok(())
    }
}

/// Forwards every batch to an HTTP workflow endpoint and relays its response items
pub struct WebhookWorkflowEngine {
    client: reqwest::Client,
    url: String,
    relay: ResultRelay,
    workflow_id: Option<String>,
}

impl WebhookWorkflowEngine {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        relay: ResultRelay,
        workflow_id: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            relay,
            workflow_id,
        })
    }
}

/// Turns a webhook response body into result items; non-object entries are dropped
pub fn response_items(body: Value) -> Vec<EngineItem> {
    match body {
        Value::Object(item) => vec![item],
        Value::Array(values) => values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(item) => Some(item),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Per-item parameters read from a webhook result item
pub fn webhook_item_parameters(item: &EngineItem) -> ItemParameters {
    ItemParameters {
        correlation_id: None,
        execution_id: string_field(item, "executionId"),
        response_text: string_field(item, "responseText").or_else(|| string_field(item, "text")),
        event: None,
        error: string_field(item, "error"),
        chat_context: item.get("chatContext").cloned(),
        chat_status: string_field(item, "chatStatus"),
    }
}

#[async_trait]
impl WorkflowEngine for WebhookWorkflowEngine {
    #[instrument(skip(self, records), fields(url = %self.url, record_count = records.len()))]
    async fn trigger(&self, records: Vec<InvocationRecord>) -> BridgeResult<()> {
        let context = TriggerContext::new(self.workflow_id.clone(), &records);

        let response = self
            .client
            .post(&self.url)
            .json(&records)
            .send()
            .await
            .map_err(|e| BridgeError::EngineRejected(format!("webhook call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::EngineRejected(format!(
                "webhook returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            BridgeError::EngineRejected(format!("failed to read webhook response: {e}"))
        })?;

        // The trigger was accepted at this point; a body we cannot use only means no results
        let items = if body.is_empty() {
            Vec::new()
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => response_items(value),
                Err(e) => {
                    error!(error = %e, "Webhook response is not JSON, no results to publish");
                    Vec::new()
                }
            }
        };

        self.relay
            .relay(&items, |_, item| webhook_item_parameters(item), &context)
            .await;

        Ok(())
    }
}
