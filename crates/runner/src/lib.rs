//! marketbus Runner - simulated services
//!
//! Wires the messaging substrate end to end inside one process:
//!
//! - **Feed**: seeded random-walk source of bars, trades and quotes
//! - **Provider**: serves historical batches and publishes live streams
//! - **Storage**: consumes streams with round-robin agents, deduplicates and
//!   serves what it stored
//! - **Simulation**: drives both services through their command topics
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │   MarketFeed     │
//!                 └────────┬─────────┘
//!                          │ entities
//!                          ▼
//!   ┌──────────────────────────────┐   stream (dataprovider.stream.>)
//!   │         DataProvider         │ ───────────────────────────────┐
//!   │  dataprovider.command        │                                │
//!   └──────────────┬───────────────┘                                ▼
//!                  │ batch (request_data)           ┌──────────────────────────────┐
//!                  └───────────────────────────────►│         DataStorage          │
//!                                                   │  datastorage.command         │
//!                                                   │  MemoryStore (fingerprints)  │
//!                                                   └──────────────────────────────┘
//! ```

pub mod error;
pub mod feed;
pub mod provider;
pub mod simulation;
pub mod storage;
pub mod store;

// Re-export main types
pub use error::{Result, ServiceError};
pub use feed::{FeedConfig, MarketFeed};
pub use provider::DataProvider;
pub use simulation::{Simulation, SimulationConfig, SimulationReport};
pub use storage::{DataStorage, StoreWorker};
pub use store::{MemoryStore, Record};
