use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Correlation ID is required for item {index}: neither the parameter, the item data nor the trigger data carries correlationId")]
    MissingCorrelationId { index: usize },

    #[error("Workflow engine rejected the trigger batch: {0}")]
    EngineRejected(String),

    #[error("Failed to publish result batch to topic {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to serialize result envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] anyhow::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
