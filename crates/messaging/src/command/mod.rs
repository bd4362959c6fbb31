//! Command surface of a component
//!
//! Every component listens on `{component}.command` in a shared queue group.
//! Requests are either CLI text, parsed with the component's clap tree, or
//! `json` followed by a [`marketbus_core::JsonCommand`].

pub mod cancel;
pub mod cli;
pub mod dispatcher;

pub use cancel::{CancelGuard, CancelRegistry};
pub use cli::{CliHandler, CommandOutput, split_args};
pub use dispatcher::{CommandContext, CommandDispatcher, JsonHandler};

/// Reply text when a command produced nothing, usually because it was cancelled
pub const NO_RESPONSE: &str = "no response provided, either component quit or command was cancelled";
