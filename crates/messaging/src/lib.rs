//! marketbus Messaging
//!
//! The messaging substrate every marketbus service is built on. Provides:
//! - Context-scoped handlers with cooperative cancellation (`handler`)
//! - Live stream publishing, one writer per stream (`producer::stream`)
//! - Batched transfer with a confirmation handshake (`producer::queue`)
//! - Queue-group consumption fanned out to worker agents (`subscriber`)
//! - A command surface with cancellable operations (`command`)
//! - The client side of the batch protocol (`request`)
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────── Bus ─────────────────────────┐
//!            │ StreamPublisher   QueuePublisher   StreamSubscriber  │
//!            └───────┬──────────────────┬─────────────────┬─────────┘
//!                    │ publish          │ batch           │ queue_subscribe
//!               ┌────▼──────────────────▼─────────────────▼────┐
//!               │                  Broker                      │
//!               └────▲────────────────────────────────▲────────┘
//!                    │ request/reply                  │
//!            CommandDispatcher                  request_data
//! ```

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod producer;
pub mod request;
pub mod subscriber;

// Re-export commonly used types
pub use bus::Bus;
pub use command::{
    CancelGuard, CancelRegistry, CliHandler, CommandContext, CommandDispatcher, CommandOutput,
    JsonHandler, NO_RESPONSE, split_args,
};
pub use config::{BusConfig, ConfigError, load_config, load_config_from_str};
pub use error::{BusError, Result};
pub use handler::{FanOutHandler, Handler, HandlerContext, SimpleHandler, Worker};
pub use producer::{QueuePublisher, StreamPublisher};
pub use request::request_data;
pub use subscriber::{QueueBuffers, StreamSubscriber};
