//! Producer side of the substrate
//!
//! - [`StreamPublisher`]: one long-lived publishing task per stream prefix
//! - [`QueuePublisher`]: one-shot batch transfer with a confirmation handshake

pub mod queue;
pub mod stream;

pub use queue::QueuePublisher;
pub use stream::StreamPublisher;
