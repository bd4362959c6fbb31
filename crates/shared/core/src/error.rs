use thiserror::Error;

use crate::types::DataType;

/// Errors raised by the pure domain layer
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("topic '{0}' is not a batch topic")]
    NotBatchTopic(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no entity is registered for data type {0}")]
    UnsupportedDataType(DataType),

    #[error("invalid stream subscription '{0}'")]
    InvalidSubscription(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
