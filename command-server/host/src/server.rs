//! Host Server Implementation
//!
//! The host side of the protocol as a standalone process:
//! - Validates the communication directory at activation (fatal on failure)
//! - Registers the editor catalog against an optional document
//! - Runs one engine invocation per trigger, one at a time
//! - Supports graceful shutdown and config reload
//!
//! ```text
//!   SIGUSR1 ──► trigger channel ──► HostServer::run
//!                                        │
//!                                 ProtocolEngine ──► FsMailbox ──► comm dir
//!                                        │
//!                                 CommandRegistry ──► Workspace
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use command_server_core::editor::{register_editor_commands, Document, Workspace};
use command_server_core::transport::{guard, CommunicationDir, FsMailbox};
use command_server_core::{
    load_config_with_overrides, CommandRegistry, CommandServerConfig, ConfigOverrides,
    EngineError, FocusFlag, InvocationOutcome, ProtocolEngine,
};

/// How often the run loop checks the shutdown and reload flags
const FLAG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-process options that do not come from the config file
#[derive(Clone, Debug)]
pub struct HostOptions {
    /// File to open as the active document
    pub document: Option<PathBuf>,
    /// Whether this instance starts focused
    pub focused: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            document: None,
            focused: true,
        }
    }
}

/// An activated host
pub struct HostServer {
    config: CommandServerConfig,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    dir: CommunicationDir,
    registry: CommandRegistry,
    focus: FocusFlag,
    engine: ProtocolEngine,
}

impl HostServer {
    /// Activate: validate the directory, open the document, register commands
    ///
    /// # Errors
    ///
    /// Fails if the communication directory cannot be created or is unsafe,
    /// or if the document cannot be read.
    pub fn activate(
        config: CommandServerConfig,
        config_path: Option<PathBuf>,
        overrides: ConfigOverrides,
        options: &HostOptions,
    ) -> Result<Self> {
        let dir = config.communication_dir();
        guard::ensure(dir.path()).with_context(|| {
            format!("Refusing to use communication directory {:?}", dir.path())
        })?;
        info!(path = ?dir.path(), "Communication directory ready");

        let workspace = Workspace::new();
        if let Some(ref path) = options.document {
            workspace.open(load_document(path)?);
        }

        let registry = CommandRegistry::new();
        register_editor_commands(&registry, &workspace);
        debug!(commands = registry.len(), "Commands registered");

        let focus = FocusFlag::new(options.focused);
        let engine = build_engine(&config, &dir, &registry, &focus);

        Ok(Self {
            config,
            config_path,
            overrides,
            dir,
            registry,
            focus,
            engine,
        })
    }

    /// The validated communication directory
    pub fn dir(&self) -> &CommunicationDir {
        &self.dir
    }

    /// Shared focus flag; flipping it affects the next invocation
    pub fn focus(&self) -> FocusFlag {
        self.focus.clone()
    }

    /// Handle one trigger
    ///
    /// # Errors
    ///
    /// Returns the engine's reason for not answering; the engine has already
    /// logged it.
    pub async fn invoke_once(&self) -> Result<InvocationOutcome, EngineError> {
        self.engine.handle_invocation().await
    }

    /// Serve triggers until shutdown or until the trigger source closes
    ///
    /// # Errors
    ///
    /// Invocation failures are contained; only setup failures are returned.
    pub async fn run(
        &mut self,
        mut triggers: mpsc::Receiver<()>,
        shutdown: Arc<AtomicBool>,
        reload_config: Arc<AtomicBool>,
    ) -> Result<()> {
        info!(path = ?self.dir.path(), "Waiting for triggers");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping trigger loop");
                break;
            }

            if reload_config.swap(false, Ordering::SeqCst) {
                info!("Config reload requested");
                if let Err(e) = self.reload_config() {
                    warn!(error = %e, "Config reload failed, keeping current configuration");
                }
            }

            match tokio::time::timeout(FLAG_POLL_INTERVAL, triggers.recv()).await {
                Ok(Some(())) => {
                    // Outcome is logged by the engine
                    let _ = self.invoke_once().await;
                }
                Ok(None) => {
                    info!("Trigger source closed");
                    break;
                }
                Err(_) => {}
            }
        }

        Ok(())
    }

    /// Reload the configuration file and rebuild the engine
    ///
    /// The communication directory is fixed for the life of the process.
    fn reload_config(&mut self) -> Result<()> {
        let mut config = load_config_with_overrides(self.config_path.clone(), &self.overrides)?;

        if config.communication_dir() != self.dir {
            warn!(
                current = ?self.dir.path(),
                configured = ?config.communication_dir().path(),
                "Communication directory changes require a restart"
            );
            config.service_name.clone_from(&self.config.service_name);
            config.temp_root.clone_from(&self.config.temp_root);
        }

        self.engine = build_engine(&config, &self.dir, &self.registry, &self.focus);
        info!(
            staleness_threshold_ms = config.staleness_threshold.as_millis(),
            "Configuration reloaded"
        );
        self.config = config;
        Ok(())
    }
}

fn build_engine(
    config: &CommandServerConfig,
    dir: &CommunicationDir,
    registry: &CommandRegistry,
    focus: &FocusFlag,
) -> ProtocolEngine {
    ProtocolEngine::new(
        Arc::new(FsMailbox::new(dir.clone())),
        Arc::new(registry.clone()),
    )
    .with_focus(Arc::new(focus.clone()))
    .with_staleness_threshold(config.staleness_threshold)
}

fn load_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {path:?}"))?;
    info!(path = ?path, "Opened document");
    Ok(Document::new(path, &text))
}
