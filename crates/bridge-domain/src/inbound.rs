use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::settings::{non_blank, InboundSettings};
use crate::traits::WorkflowEngine;
use crate::types::{id_string, InboundEnvelope, InvocationRecord, ParsedEvent};

/// Two-stage filter applied to decoded payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Required value of the `event` field
    pub event: Option<String>,
    /// Required value of the `workflowId` field; a missing `workflowId` passes
    pub workflow_id: Option<String>,
}

/// Why a message was handled without reaching the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    EventMismatch,
    WorkflowMismatch,
    EmptyBatch,
}

/// How one inbound message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Empty body; nothing was done and no commit is needed
    Skipped,
    /// Filtered out; counts as handled and is committed
    Dropped(DropReason),
    /// Accepted by the engine; committed
    Delivered { records: usize },
}

impl MessageOutcome {
    pub fn should_commit(&self) -> bool {
        !matches!(self, MessageOutcome::Skipped)
    }
}

impl EventFilter {
    pub fn new(event: Option<String>, workflow_id: Option<String>) -> Self {
        Self {
            event: non_blank(event),
            workflow_id: non_blank(workflow_id),
        }
    }

    /// Checks one decoded payload against both filters
    pub fn check(&self, element: &Value) -> Result<(), DropReason> {
        if let Some(expected) = &self.event {
            let actual = element.as_object().and_then(|o| o.get("event"));
            if actual.and_then(Value::as_str) != Some(expected.as_str()) {
                return Err(DropReason::EventMismatch);
            }
        }

        if let Some(expected) = &self.workflow_id {
            let actual = element
                .as_object()
                .and_then(|o| o.get("workflowId"))
                .and_then(id_string);
            if let Some(actual) = actual {
                if &actual != expected {
                    return Err(DropReason::WorkflowMismatch);
                }
            }
        }

        Ok(())
    }

    /// Filters a decoded payload as one message, then normalizes it into records.
    ///
    /// A sequence is checked as a whole: it has no `event` of its own, so an event
    /// filter drops it, while a workflow filter lets it through. Elements of a
    /// surviving sequence become one record each.
    pub fn apply(&self, payload: Value) -> Result<Vec<InvocationRecord>, DropReason> {
        self.check(&payload)?;

        match payload {
            Value::Array(elements) if elements.is_empty() => Err(DropReason::EmptyBatch),
            Value::Array(elements) => Ok(elements
                .into_iter()
                .map(InvocationRecord::from_value)
                .collect()),
            single => Ok(vec![InvocationRecord::from_value(single)]),
        }
    }
}

/// Decodes a message body; decode failures become data, not errors
pub fn decode_body(body: &[u8], parse_json: bool) -> ParsedEvent {
    let raw = String::from_utf8_lossy(body).into_owned();

    if !parse_json {
        return ParsedEvent::Decoded(Value::String(raw));
    }

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => ParsedEvent::Decoded(value),
        Err(e) => ParsedEvent::Malformed {
            parse_error: e.to_string(),
            raw,
        },
    }
}

/// Domain service for the consumer side: decode → filter → normalize → trigger
pub struct InboundBridgeService {
    engine: Arc<dyn WorkflowEngine>,
    filter: EventFilter,
    parse_json: bool,
}

impl InboundBridgeService {
    pub fn new(engine: Arc<dyn WorkflowEngine>, filter: EventFilter, parse_json: bool) -> Self {
        Self {
            engine,
            filter,
            parse_json,
        }
    }

    pub fn from_settings(engine: Arc<dyn WorkflowEngine>, settings: &InboundSettings) -> Self {
        Self::new(
            engine,
            EventFilter::new(
                settings.event_filter.clone(),
                settings.workflow_filter.clone(),
            ),
            settings.parse_json,
        )
    }

    /// Handle one message.
    ///
    /// An `Err` means the engine did not accept the batch; the caller must not
    /// advance the offset so the message is read again.
    pub async fn handle_message(&self, envelope: &InboundEnvelope) -> BridgeResult<MessageOutcome> {
        let body = match envelope.payload.as_deref() {
            Some(body) if !body.is_empty() => body,
            _ => {
                debug!(
                    topic = %envelope.topic,
                    partition = envelope.partition,
                    offset = envelope.offset,
                    "Skipping message with empty body"
                );
                return Ok(MessageOutcome::Skipped);
            }
        };

        let records = match decode_body(body, self.parse_json) {
            ParsedEvent::Decoded(payload) => match self.filter.apply(payload) {
                Ok(records) => records,
                Err(reason) => {
                    debug!(
                        topic = %envelope.topic,
                        partition = envelope.partition,
                        offset = envelope.offset,
                        reason = ?reason,
                        "Message filtered out"
                    );
                    return Ok(MessageOutcome::Dropped(reason));
                }
            },
            ParsedEvent::Malformed { parse_error, raw } => {
                warn!(
                    topic = %envelope.topic,
                    partition = envelope.partition,
                    offset = envelope.offset,
                    error = %parse_error,
                    "Message body is not valid JSON, delivering it as a parse-error record"
                );
                vec![InvocationRecord::malformed(parse_error, raw)]
            }
        };

        let count = records.len();
        self.engine.trigger(records).await.map_err(|e| match e {
            BridgeError::EngineRejected(_) => e,
            other => BridgeError::EngineRejected(other.to_string()),
        })?;

        info!(
            topic = %envelope.topic,
            partition = envelope.partition,
            offset = envelope.offset,
            records = count,
            "Delivered message to workflow engine"
        );

        Ok(MessageOutcome::Delivered { records: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockWorkflowEngine;
    use serde_json::json;

    fn envelope(body: &str) -> InboundEnvelope {
        InboundEnvelope {
            topic: "botamin.n8n.input".to_string(),
            partition: 0,
            offset: 7,
            payload: Some(body.as_bytes().to_vec()),
        }
    }

    fn chat_filter() -> EventFilter {
        EventFilter::new(Some("ChatMessageInput".to_string()), None)
    }

    #[test]
    fn test_decode_round_trips_structured_object() {
        let original = json!({"event": "ChatMessageInput", "meta": {"a": [1, 2]}, "n": 1.5});
        let body = serde_json::to_vec(&original).unwrap();

        assert_eq!(decode_body(&body, true), ParsedEvent::Decoded(original));
    }

    #[test]
    fn test_decode_failure_is_data() {
        match decode_body(b"{not json", true) {
            ParsedEvent::Malformed { parse_error, raw } => {
                assert!(!parse_error.is_empty());
                assert_eq!(raw, "{not json");
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_without_json_keeps_raw_string() {
        assert_eq!(
            decode_body(b"{\"a\":1}", false),
            ParsedEvent::Decoded(json!("{\"a\":1}"))
        );
    }

    #[test]
    fn test_blank_filters_are_disabled() {
        let filter = EventFilter::new(Some("".to_string()), Some("  ".to_string()));
        assert_eq!(filter, EventFilter::default());
        assert!(filter.check(&json!(5)).is_ok());
    }

    #[test]
    fn test_event_filter_rejects_other_events_and_scalars() {
        let filter = chat_filter();
        assert_eq!(
            filter.check(&json!({"event": "Other"})),
            Err(DropReason::EventMismatch)
        );
        assert_eq!(
            filter.check(&json!("ChatMessageInput")),
            Err(DropReason::EventMismatch)
        );
        assert!(filter.check(&json!({"event": "ChatMessageInput"})).is_ok());
    }

    #[test]
    fn test_workflow_filter_passes_missing_workflow_id() {
        let filter = EventFilter::new(None, Some("w1".to_string()));
        assert!(filter.check(&json!({"event": "X"})).is_ok());
        assert!(filter.check(&json!({"workflowId": null})).is_ok());
        assert!(filter.check(&json!({"workflowId": "w1"})).is_ok());
        assert_eq!(
            filter.check(&json!({"workflowId": "w2"})),
            Err(DropReason::WorkflowMismatch)
        );
    }

    #[test]
    fn test_workflow_filter_compares_as_string() {
        let filter = EventFilter::new(None, Some("42".to_string()));
        assert!(filter.check(&json!({"workflowId": 42})).is_ok());
    }

    #[test]
    fn test_event_filter_drops_sequence_as_a_whole() {
        let result = chat_filter().apply(json!([
            {"event": "ChatMessageInput", "correlationId": "a"},
            {"event": "ChatMessageInput", "correlationId": "b"}
        ]));

        assert_eq!(result, Err(DropReason::EventMismatch));
    }

    #[test]
    fn test_workflow_filter_passes_sequence_whole() {
        let filter = EventFilter::new(None, Some("w1".to_string()));

        let records = filter
            .apply(json!([{"workflowId": "w2"}, {"workflowId": "w1"}]))
            .unwrap();

        let ids: Vec<_> = records
            .iter()
            .map(|r| r.fields().workflow_id.unwrap())
            .collect();
        assert_eq!(ids, ["w2", "w1"]);
    }

    #[test]
    fn test_empty_sequence_is_dropped() {
        assert_eq!(
            EventFilter::default().apply(json!([])),
            Err(DropReason::EmptyBatch)
        );
    }

    #[test]
    fn test_unfiltered_sequence_wraps_scalars() {
        let records = EventFilter::default()
            .apply(json!([{"a": 1}, "text", null]))
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get("data"), Some(&json!("text")));
        assert_eq!(records[2].get("data"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_chat_message_is_delivered() {
        // Arrange
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_trigger()
            .withf(|records: &Vec<InvocationRecord>| {
                records.len() == 1
                    && records[0].as_map()
                        == json!({
                            "event": "ChatMessageInput",
                            "correlationId": "c1",
                            "workflowId": "w1"
                        })
                        .as_object()
                        .unwrap()
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = InboundBridgeService::new(
            Arc::new(engine),
            EventFilter::new(Some("ChatMessageInput".to_string()), Some("".to_string())),
            true,
        );

        // Act
        let outcome = service
            .handle_message(&envelope(
                r#"{"event":"ChatMessageInput","correlationId":"c1","workflowId":"w1"}"#,
            ))
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, MessageOutcome::Delivered { records: 1 });
        assert!(outcome.should_commit());
    }

    #[tokio::test]
    async fn test_empty_body_is_skipped_without_engine_call() {
        let mut engine = MockWorkflowEngine::new();
        engine.expect_trigger().times(0);
        let service = InboundBridgeService::new(Arc::new(engine), chat_filter(), true);

        let mut message = envelope("");
        let outcome = service.handle_message(&message).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Skipped);
        assert!(!outcome.should_commit());

        message.payload = None;
        assert_eq!(
            service.handle_message(&message).await.unwrap(),
            MessageOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_filtered_message_is_handled_without_engine_call() {
        let mut engine = MockWorkflowEngine::new();
        engine.expect_trigger().times(0);
        let service = InboundBridgeService::new(
            Arc::new(engine),
            EventFilter::new(None, Some("w1".to_string())),
            true,
        );

        let outcome = service
            .handle_message(&envelope(r#"{"event":"ChatMessageInput","workflowId":"w2"}"#))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Dropped(DropReason::WorkflowMismatch));
        assert!(outcome.should_commit());
    }

    #[tokio::test]
    async fn test_malformed_body_reaches_engine_despite_event_filter() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_trigger()
            .withf(|records: &Vec<InvocationRecord>| {
                records.len() == 1
                    && records[0].get("raw") == Some(&json!("oops"))
                    && records[0].get("parseError").is_some()
            })
            .times(1)
            .returning(|_| Ok(()));
        let service = InboundBridgeService::new(Arc::new(engine), chat_filter(), true);

        let outcome = service.handle_message(&envelope("oops")).await.unwrap();

        assert_eq!(outcome, MessageOutcome::Delivered { records: 1 });
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported_as_rejection() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_trigger()
            .times(1)
            .returning(|_| Err(BridgeError::Infrastructure(anyhow::anyhow!("engine down"))));
        let service = InboundBridgeService::new(Arc::new(engine), EventFilter::default(), true);

        let result = service.handle_message(&envelope(r#"{"event":"X"}"#)).await;

        match result {
            Err(BridgeError::EngineRejected(reason)) => assert!(reason.contains("engine down")),
            other => panic!("expected engine rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raw_mode_wraps_body_in_data() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_trigger()
            .withf(|records: &Vec<InvocationRecord>| {
                records[0].get("data") == Some(&json!("plain text"))
            })
            .times(1)
            .returning(|_| Ok(()));
        let service = InboundBridgeService::new(Arc::new(engine), EventFilter::default(), false);

        let outcome = service.handle_message(&envelope("plain text")).await.unwrap();

        assert_eq!(outcome, MessageOutcome::Delivered { records: 1 });
    }
}
