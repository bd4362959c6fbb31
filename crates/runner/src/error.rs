use marketbus_core::CoreError;
use marketbus_messaging::{BusError, ConfigError};
use marketbus_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation {0} not supported")]
    Unsupported(String),

    #[error("stream request needs at least one symbol and one data type")]
    EmptyStreamRequest,

    #[error("{component} replied with failure: {err}")]
    Remote { component: String, err: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
