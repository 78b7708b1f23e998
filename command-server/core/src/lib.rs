//! Command Server Core - File-Based Command IPC
//!
//! Lets an external process (a voice or scripting client) ask a running host
//! application to execute a named command and return its result. The two
//! sides share nothing but a per-user directory:
//!
//! ```text
//! ┌──────────────┐   request.json    ┌────────────────────────────────────┐
//! │    Client    │ ────────────────► │  Communication directory (0700)    │
//! │              │                   │                                    │
//! │  write req   │   trigger         │                                    │
//! │  fire ───────┼──────────────┐    │                                    │
//! │  poll resp ◄─┼──────┐       │    └───────────────┬────────────────────┘
//! └──────────────┘      │       ▼                    │
//!                       │   ┌───────────────────────┴────────────────────┐
//!          response.json│   │              Protocol Engine               │
//!        (create-excl.) │   │  staleness ─► claim slot ─► parse ─►       │
//!                       └───┤  dispatch ─► wait policy ─► commit         │
//!                           │                  │                         │
//!                           │          Command Executor                  │
//!                           └────────────────────────────────────────────┘
//! ```
//!
//! Several host instances may react to the same trigger. Exclusive creation
//! of the response file elects exactly one of them, and the response's
//! trailing newline tells the client it is complete.
//!
//! # Module Overview
//!
//! - [`transport`]: directory resolution, the directory guard, request and
//!   response framing, and the mailbox implementations
//! - [`engine`]: the per-trigger protocol state machine
//! - [`executor`]: the command registry the engine dispatches into
//! - [`messages`]: request and response documents
//! - [`client`]: the writer side of the protocol
//! - [`editor`]: the editor command catalog
//! - [`config`]: TOML/env configuration

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod editor;
pub mod engine;
pub mod executor;
pub mod messages;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientError, CommandClient, NoopTrigger, Trigger};
pub use engine::{
    AlwaysFocused, EngineError, FocusFlag, FocusProbe, InvocationOutcome, InvocationState,
    ProtocolEngine,
};
pub use executor::{CommandArgs, CommandError, CommandExecutor, CommandFuture, CommandRegistry};
pub use messages::{Request, Response, WaitPolicy};

// Editor exports
pub use editor::{register_editor_commands, Document, Position, Selection, Workspace};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_overrides,
    CommandServerConfig, CommandServerToml, ConfigError, ConfigOverrides, ConfigSource,
};
