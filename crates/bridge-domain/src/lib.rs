pub mod error;
pub mod inbound;
pub mod outbound;
pub mod settings;
pub mod traits;
pub mod types;

pub use error::{BridgeError, BridgeResult};
pub use inbound::{decode_body, DropReason, EventFilter, InboundBridgeService, MessageOutcome};
pub use outbound::{assemble_envelope, resolve_identity, OutboundBridgeService, ResolvedIdentity};
pub use settings::{non_blank, BrokerList, InboundSettings, OutboundSettings, FALLBACK_BROKERS};
pub use traits::{ExecutionContext, NoExecutionContext, ResultEnvelopeProducer, WorkflowEngine};
pub use types::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use traits::MockExecutionContext;
#[cfg(any(test, feature = "testing"))]
pub use traits::MockResultEnvelopeProducer;
#[cfg(any(test, feature = "testing"))]
pub use traits::MockWorkflowEngine;
