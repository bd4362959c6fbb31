//! Error types for the messaging crate

use marketbus_core::CoreError;
use marketbus_transport::TransportError;
use thiserror::Error;

/// Messaging substrate errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a queue with a response for topic {0} already exists")]
    QueueExists(String),

    #[error("cancel key {0} already exists")]
    CancelKeyExists(String),

    #[error("cancel function not found for key {0}")]
    CancelKeyNotFound(String),

    #[error("batch message addressed to {found}, expected {expected}")]
    TopicMismatch { expected: String, found: String },

    #[error("handler has no agents")]
    NoAgents,

    #[error("handler channel closed")]
    HandlerClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
