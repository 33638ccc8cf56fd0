use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid progress record for {topic_id}: {reason}")]
    InvalidRecord { topic_id: String, reason: String },

    #[error("Invalid progress configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ProgressError>;
