use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BridgeResult;
use crate::settings::BrokerList;
use crate::types::{InvocationRecord, ResultEnvelope};

/// The external workflow engine, as seen by the inbound bridge
///
/// One call is one trigger event; the records are its items. Returning an
/// error means the batch was not accepted and the message must be redelivered.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn trigger(&self, records: Vec<InvocationRecord>) -> BridgeResult<()>;
}

/// Ambient engine state available to the outbound bridge while it resolves an item
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ExecutionContext: Send + Sync {
    /// Id of the running execution, if the engine wires it through
    fn execution_id(&self) -> Option<String>;

    /// Id of the workflow being executed
    fn workflow_id(&self) -> Option<String>;

    /// Last item emitted by a prior stage, looked up by the stage's name
    fn stage_output(&self, stage_name: &str) -> Option<Map<String, Value>>;
}

/// Context for callers that have no engine state to offer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExecutionContext;

impl ExecutionContext for NoExecutionContext {
    fn execution_id(&self) -> Option<String> {
        None
    }

    fn workflow_id(&self) -> Option<String> {
        None
    }

    fn stage_output(&self, _stage_name: &str) -> Option<Map<String, Value>> {
        None
    }
}

/// Publishes a fully validated batch of result envelopes
/// Infrastructure layer (e.g., bridge-kafka) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ResultEnvelopeProducer: Send + Sync {
    /// Connects to `brokers`, sends every envelope in one call, then disconnects
    async fn publish_batch(
        &self,
        brokers: &BrokerList,
        topic: &str,
        envelopes: &[ResultEnvelope],
    ) -> BridgeResult<()>;
}
