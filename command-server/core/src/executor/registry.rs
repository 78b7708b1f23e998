//! Command Registry
//!
//! Maps command identifiers to handlers and implements [`CommandExecutor`]
//! by lookup. Handlers are registered once at activation and looked up on
//! every dispatch, so the map sits behind an `RwLock`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;

use super::{CommandArgs, CommandError, CommandExecutor, CommandFuture};

/// A registered operation
pub trait CommandHandler: Send + Sync {
    /// Start the operation
    fn call(&self, args: CommandArgs) -> CommandFuture;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CommandError>> + Send + 'static,
{
    fn call(&self, args: CommandArgs) -> CommandFuture {
        self(args).boxed()
    }
}

/// Identifier-to-handler map
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn CommandHandler>>>>,
}

impl CommandRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler, replacing any previous one for `id`
    pub fn register<H>(&self, id: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        let id = id.into();
        tracing::debug!(command_id = %id, "Registering command");
        if self.handlers.write().insert(id.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(command_id = %id, "Replaced existing command handler");
        }
    }

    /// Register a handler that completes synchronously
    ///
    /// The handler runs when the returned future is first polled, not at
    /// dispatch time.
    pub fn register_sync<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(CommandArgs) -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(id, move |args: CommandArgs| {
            let handler = Arc::clone(&handler);
            async move { handler(args) }
        });
    }

    /// Remove a handler, returning whether one was registered
    pub fn unregister(&self, id: &str) -> bool {
        self.handlers.write().remove(id).is_some()
    }

    /// Whether `id` is registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.read().contains_key(id)
    }

    /// Registered identifiers, sorted
    #[must_use]
    pub fn command_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.command_ids())
            .finish()
    }
}

impl CommandExecutor for CommandRegistry {
    fn dispatch(&self, command_id: &str, args: Vec<Value>) -> Result<CommandFuture, CommandError> {
        let handler = self
            .handlers
            .read()
            .get(command_id)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(command_id.to_string()))?;

        Ok(handler.call(CommandArgs::new(command_id, args)))
    }
}
