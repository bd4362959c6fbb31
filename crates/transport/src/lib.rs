//! marketbus Transport
//!
//! Broker layer for marketbus. Provides:
//! - The [`Broker`] trait: plain pub/sub, queue-group subscriptions and
//!   request/reply over reply inboxes
//! - NATS-style subject matching (`*` matches one token, `>` the rest)
//! - [`InMemoryBroker`], a single-process broker used by tests and simulations
//!
//! ## Architecture
//!
//! ```text
//!  publish("a.stream.x.AAPL")
//!         │
//!    ┌────▼─────┐   plain subscribers: every match receives a copy
//!    │  Broker  │── queue groups:     one member per group receives it
//!    └────┬─────┘   request/reply:    reply lands on a private _INBOX subject
//!         │
//!   Subscription (unbounded, FIFO per subscriber)
//! ```
//!
//! Delivery is at-most-once and unordered across subscribers. The trait
//! allows plugging in a networked broker without touching the messaging layer.

pub mod broker;
pub mod error;
pub mod memory;
pub mod subject;

// Re-export commonly used types
pub use broker::{Broker, BrokerMessage, Subscription};
pub use error::TransportError;
pub use memory::InMemoryBroker;
pub use subject::{INBOX_PREFIX, matches, validate_pattern, validate_subject};
