//! marketbus Core Domain
//!
//! Pure domain types shared by every marketbus service: topic addressing,
//! the wire envelope, content fingerprints, entities and the JSON command
//! payloads exchanged over the command surface.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod batch;
pub mod command;
pub mod entities;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod request;
pub mod response;
pub mod topic;
pub mod types;

// Re-export commonly used types at crate root
pub use batch::{batch_fingerprint, decode_batch, messages_for_batch};
pub use command::{JSON_COMMAND_PREFIX, JsonCommand, strip_json_prefix};
pub use entities::{Bar, News, NewsSentiment, Quote, Timestamp, Trade, fingerprint_of};
pub use error::{CoreError, Result};
pub use fingerprint::{Fingerprint, hash_struct};
pub use message::Message;
pub use request::{
    DEFAULT_AGENT_COUNT, DataRequest, StreamRequest, StreamSubscribeRequest, StreamSubscription,
};
pub use response::{DataResponse, Reply, Response, StreamResponse};
pub use topic::{Topic, is_queue, last_segment, queue_components, queue_count, stream_prefix};
pub use types::{
    AssetClass, Component, DataOperation, DataType, Functionality, JsonOperation, OpStatus,
    StreamOperation, TimeFrame, sources,
};
