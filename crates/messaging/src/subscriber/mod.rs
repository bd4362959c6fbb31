//! Consumer side of the substrate

pub mod buffer;
pub mod stream;

pub use buffer::QueueBuffers;
pub use stream::{StreamSubscriber, SubscriberHandler};
