use crate::consumer::{MessageProcessor, ProcessingResult};
use bridge_domain::{InboundBridgeService, InboundEnvelope};
use std::sync::Arc;
use tracing::warn;

/// Create a MessageProcessor that runs each message through the inbound bridge service
///
/// Empty messages are skipped, filtered and delivered messages are committed,
/// and engine rejections are redelivered.
pub fn create_inbound_processor(service: Arc<InboundBridgeService>) -> MessageProcessor {
    Box::new(move |message: InboundEnvelope| {
        let service = Arc::clone(&service);

        Box::pin(async move {
            match service.handle_message(&message).await {
                Ok(outcome) if outcome.should_commit() => Ok(ProcessingResult::Commit),
                Ok(_) => Ok(ProcessingResult::Skip),
                Err(e) => {
                    warn!(
                        error = %e,
                        partition = message.partition,
                        offset = message.offset,
                        "Inbound bridge did not hand the message off"
                    );
                    Ok(ProcessingResult::Redeliver(Some(e.to_string())))
                }
            }
        })
    })
}
