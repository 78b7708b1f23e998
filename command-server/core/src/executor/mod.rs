//! Command Executor
//!
//! The host's capability to run a named operation. The protocol engine only
//! sees the [`CommandExecutor`] trait: an identifier and positional JSON
//! arguments go in, a future of a JSON value or [`CommandError`] comes out.
//!
//! # Usage
//!
//! ```ignore
//! use command_server_core::executor::{CommandArgs, CommandRegistry};
//!
//! let registry = CommandRegistry::new();
//! registry.register_sync("math.add", |args: CommandArgs| {
//!     let a: i64 = args.required(0, "a")?;
//!     let b: i64 = args.required(1, "b")?;
//!     Ok(serde_json::json!(a + b))
//! });
//! ```

mod args;
mod registry;

pub use args::CommandArgs;
pub use registry::{CommandHandler, CommandRegistry};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Future produced by a dispatched operation
pub type CommandFuture = BoxFuture<'static, Result<Value, CommandError>>;

/// Failures of a dispatched operation
///
/// The `Display` text is what the client receives in the response's
/// `error` field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No handler is registered under this identifier
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Arguments are missing, mistyped, or out of range
    #[error("Invalid arguments for {command}: {message}")]
    InvalidArguments {
        /// Command identifier
        command: String,
        /// What was wrong
        message: String,
    },

    /// The operation needs an open document and there is none
    #[error("No active editor")]
    NoActiveEditor,

    /// The operation ran and failed
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Shorthand for an operation failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Dispatcher for named operations
pub trait CommandExecutor: Send + Sync {
    /// Look up `command_id` and start it with `args`
    ///
    /// Lookup failures are returned immediately so they can be reported even
    /// when the caller never awaits the operation. The returned future is
    /// `'static` so it can be detached.
    fn dispatch(&self, command_id: &str, args: Vec<Value>) -> Result<CommandFuture, CommandError>;
}
