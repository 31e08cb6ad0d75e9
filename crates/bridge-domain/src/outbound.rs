use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::settings::{non_blank, OutboundSettings};
use crate::traits::{ExecutionContext, ResultEnvelopeProducer};
use crate::types::{
    ChatStatus, EngineItem, EventFields, ExecutionStatus, ItemParameters, ResultBody,
    ResultEnvelope, CHAT_MESSAGE_RESPONSE, DEFAULT_DOMAIN, TRIGGER_STAGE_NAME,
};

/// Identity of one item after walking the fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub correlation_id: String,
    pub workflow_id: Option<String>,
    /// Fields of the object that supplied the correlation context
    pub context: EventFields,
}

/// Walks the correlation fallback chain for one item.
///
/// correlationId: parameter override → item's `correlationId` → trigger stage
/// output's `correlationId`. When the item carries no correlation id the
/// trigger stage output is merged over the item, so the remaining identifying
/// fields come from the trigger as well.
pub fn resolve_identity(
    index: usize,
    item: &EngineItem,
    override_correlation_id: Option<&str>,
    context: &dyn ExecutionContext,
) -> BridgeResult<ResolvedIdentity> {
    let item_fields = EventFields::from_object(item);

    let fields = match item_fields.correlation_id {
        Some(_) => item_fields,
        None => match context.stage_output(TRIGGER_STAGE_NAME) {
            Some(trigger) => {
                let mut merged: Map<String, Value> = item.clone();
                merged.extend(trigger);
                EventFields::from_object(&merged)
            }
            None => item_fields,
        },
    };

    let correlation_id = override_correlation_id
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .or_else(|| fields.correlation_id.clone())
        .ok_or(BridgeError::MissingCorrelationId { index })?;

    let workflow_id = fields
        .workflow_id
        .clone()
        .or_else(|| non_blank(context.workflow_id()));

    Ok(ResolvedIdentity {
        correlation_id,
        workflow_id,
        context: fields,
    })
}

/// Parses the chat context parameter; anything other than a non-empty object is ignored
fn parse_chat_context(raw: Option<Value>) -> Option<Map<String, Value>> {
    let value = match raw? {
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "Ignoring unparsable chat context");
                    return None;
                }
            }
        }
        other => other,
    };

    match value {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn parse_chat_status(raw: Option<String>) -> Option<ChatStatus> {
    let raw = non_blank(raw)?;
    match raw.parse() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(error = %e, "Ignoring chat status");
            None
        }
    }
}

/// Builds the envelope for one item
pub fn assemble_envelope(
    index: usize,
    item: &EngineItem,
    params: ItemParameters,
    status: ExecutionStatus,
    context: &dyn ExecutionContext,
) -> BridgeResult<ResultEnvelope> {
    let identity = resolve_identity(index, item, params.correlation_id.as_deref(), context)?;

    let execution_id = non_blank(params.execution_id)
        .or_else(|| non_blank(context.execution_id()))
        .unwrap_or_else(|| identity.correlation_id.clone());

    let event = non_blank(params.event).unwrap_or_else(|| CHAT_MESSAGE_RESPONSE.to_string());

    let mut result = ResultBody {
        text: non_blank(params.response_text),
        ..Default::default()
    };
    if event == CHAT_MESSAGE_RESPONSE {
        result.chat_context = parse_chat_context(params.chat_context);
        result.chat_status = parse_chat_status(params.chat_status);
    }

    let error = match status {
        ExecutionStatus::Error => non_blank(params.error),
        _ => None,
    };

    let fields = identity.context;
    Ok(ResultEnvelope {
        execution_id,
        workflow_id: identity.workflow_id,
        correlation_id: identity.correlation_id,
        status,
        domain: fields.domain.unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
        domain_entity_id: fields.domain_entity_id,
        company_id: fields.company_id,
        bot_id: fields.bot_id,
        event,
        result: result.non_empty(),
        meta: fields.meta,
        error,
    })
}

/// Domain service for the producer side
///
/// Every item is resolved and validated before the producer is touched, so a
/// batch is either published whole or not at all.
pub struct OutboundBridgeService {
    producer: Arc<dyn ResultEnvelopeProducer>,
}

impl OutboundBridgeService {
    pub fn new(producer: Arc<dyn ResultEnvelopeProducer>) -> Self {
        Self { producer }
    }

    /// Resolve, assemble and publish one envelope per item, preserving order.
    ///
    /// `params` is evaluated once per item with its index, the way an engine
    /// evaluates per-item expressions. Returns the number of envelopes published.
    pub async fn send<F>(
        &self,
        settings: &OutboundSettings,
        items: &[EngineItem],
        params: F,
        context: &dyn ExecutionContext,
    ) -> BridgeResult<usize>
    where
        F: Fn(usize, &EngineItem) -> ItemParameters,
    {
        settings.validate()?;

        let envelopes = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                assemble_envelope(index, item, params(index, item), settings.status, context)
            })
            .collect::<BridgeResult<Vec<_>>>()?;

        debug!(
            topic = %settings.topic,
            item_count = envelopes.len(),
            status = %settings.status,
            "Assembled result batch"
        );

        self.producer
            .publish_batch(&settings.brokers, &settings.topic, &envelopes)
            .await?;

        info!(
            topic = %settings.topic,
            item_count = envelopes.len(),
            "Published result batch"
        );

        Ok(envelopes.len())
    }
}
