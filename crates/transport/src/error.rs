//! Error types for the transport crate

use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid subject: '{0}'")]
    InvalidSubject(String),

    #[error("No responders for subject {0}")]
    NoResponders(String),

    #[error("Message on {0} has no reply subject")]
    NoReplySubject(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout waiting for response")]
    Timeout,
}
