//! Command Server - Reference Host and Client
//!
//! Runs a host that answers command requests through the communication
//! directory, or acts as the client that sends them.
//!
//! # Usage
//!
//! ```bash
//! # Serve a document, answering one request per SIGUSR1
//! command-server serve --document notes.txt
//!
//! # Run in the background
//! command-server serve --document notes.txt --background
//!
//! # Send a command and print the response
//! command-server send editor.selectLine 3
//! command-server send editor.getSelectedText --return-output
//!
//! # Where the communication directory lives
//! command-server path
//!
//! # Verbose logging
//! RUST_LOG=debug command-server serve
//! ```
//!
//! # Signals
//!
//! - `SIGUSR1`: Handle the pending request
//! - `SIGUSR2`: Toggle whether this instance counts as focused
//! - `SIGTERM` / `SIGINT`: Graceful shutdown
//! - `SIGHUP`: Reload configuration
//!
//! Handlers are installed before the PID file is written, so a client that
//! finds the PID file can always signal safely.

mod server;
mod trigger;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use command_server_core::transport::{guard, FsMailbox};
use command_server_core::{
    default_config_path, load_config_with_overrides, CommandClient, CommandServerConfig,
    ConfigOverrides, FocusProbe, Request,
};

use server::{HostOptions, HostServer};
use trigger::{
    check_existing_host, default_pid_path, read_pid_file, remove_pid_file, write_pid_file,
    SignalTrigger,
};

/// Pending triggers beyond this are dropped; the request is read once anyway
const TRIGGER_QUEUE: usize = 16;

/// Command Server - file-based command IPC host and client
#[derive(Parser, Debug)]
#[command(name = "command-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short = 'c',
        long,
        env = "COMMAND_SERVER_CONFIG",
        value_name = "FILE",
        global = true
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short = 'l',
        long,
        env = "COMMAND_SERVER_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: String,

    /// Service name the communication directory is derived from
    #[arg(long, value_name = "NAME", global = true)]
    service_name: Option<String>,

    /// Directory to create the communication directory under
    #[arg(long, value_name = "DIR", global = true)]
    temp_root: Option<PathBuf>,

    /// Staleness threshold in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    staleness_ms: Option<u64>,

    /// Client response timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    response_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: HostCommand,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            service_name: self.service_name.clone(),
            temp_root: self.temp_root.clone(),
            staleness_threshold_ms: self.staleness_ms,
            response_timeout_ms: self.response_timeout_ms,
        }
    }
}

#[derive(Subcommand, Debug)]
enum HostCommand {
    /// Activate and answer one request per SIGUSR1 until stopped
    Serve(ServeArgs),
    /// Activate and handle the pending request once
    ///
    /// The process exits right after the response is written, so a
    /// fire-and-forget command may be cut short or never start.
    Invoke(InvokeArgs),
    /// Send a command to a serving host and print the response
    Send(SendArgs),
    /// Print the communication directory
    Path,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// File to open as the active document
    #[arg(long, value_name = "FILE")]
    document: Option<PathBuf>,

    /// Start as an unfocused instance (responses carry a warning)
    #[arg(long)]
    inactive: bool,

    /// Run in the background (fork and detach)
    #[arg(short = 'd', long)]
    background: bool,

    /// PID file path (defaults to the communication directory)
    #[arg(long, env = "COMMAND_SERVER_PID_FILE", value_name = "PATH")]
    pid_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InvokeArgs {
    /// File to open as the active document
    #[arg(long, value_name = "FILE")]
    document: Option<PathBuf>,

    /// Act as an unfocused instance
    #[arg(long)]
    inactive: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Command identifier, e.g. `editor.jumpToLine`
    command_id: String,

    /// Positional arguments, parsed as JSON where possible
    #[arg(allow_negative_numbers = true)]
    args: Vec<String>,

    /// Wait for the command and return its result
    #[arg(short = 'r', long)]
    return_output: bool,

    /// Wait for the command to finish
    #[arg(short = 'w', long)]
    wait: bool,

    /// Host process to signal (defaults to the PID file)
    #[arg(long, value_name = "PID", value_parser = clap::value_parser!(i32).range(1..))]
    pid: Option<i32>,
}

/// Parse a command-line argument as JSON, falling back to a string
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so `send` output stays machine-readable.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "command_server={level},command_server_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(())
}

/// Load the config file, environment, and CLI overrides
fn load_configuration(
    path: Option<PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<CommandServerConfig> {
    if let Some(ref explicit) = path {
        if !explicit.exists() {
            anyhow::bail!("Config file not found: {explicit:?}");
        }
    }

    let config = load_config_with_overrides(path.or_else(default_config_path), overrides)
        .context("Failed to load configuration")?;

    debug!(source = %config.source(), "Configuration loaded");
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

/// Daemonize the process (fork to background)
fn daemonize() -> Result<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    // First fork
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => anyhow::bail!("First fork failed: {e}"),
    }

    setsid().context("setsid failed")?;

    // Second fork (prevent acquiring controlling terminal)
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => anyhow::bail!("Second fork failed: {e}"),
    }

    Ok(())
}

fn serve(
    config: CommandServerConfig,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    args: ServeArgs,
) -> Result<()> {
    let pid_path = args
        .pid_file
        .unwrap_or_else(|| default_pid_path(&config.communication_dir()));
    let options = HostOptions {
        document: args.document,
        focused: !args.inactive,
    };

    // Activation is fatal on an unsafe directory, before anything is written
    let server = HostServer::activate(config, config_path, overrides, &options)?;
    check_existing_host(&pid_path)?;

    // The runtime must not exist yet when forking
    if args.background {
        info!("Daemonizing...");
        daemonize()?;
        info!("Daemonized, new PID: {}", std::process::id());
    }

    let result = runtime().and_then(|rt| rt.block_on(run_server(server, &pid_path)));

    info!("Shutting down...");
    remove_pid_file(&pid_path);

    match result {
        Ok(()) => {
            info!("Host stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Host stopped with error");
            Err(e)
        }
    }
}

/// Signal streams the host listens on
struct HostSignals {
    trigger: Signal,
    focus: Signal,
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl HostSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            trigger: signal(SignalKind::user_defined1())
                .context("Failed to install SIGUSR1 handler")?,
            focus: signal(SignalKind::user_defined2())
                .context("Failed to install SIGUSR2 handler")?,
            terminate: signal(SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?,
            interrupt: signal(SignalKind::interrupt())
                .context("Failed to install SIGINT handler")?,
            hangup: signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?,
        })
    }
}

/// Install the signal handlers, then publish the PID file
///
/// Until the handlers exist, `SIGUSR1` would terminate the process.
fn announce(pid_path: &Path) -> Result<HostSignals> {
    let signals = HostSignals::install()?;
    write_pid_file(pid_path)?;
    Ok(signals)
}

async fn run_server(mut server: HostServer, pid_path: &Path) -> Result<()> {
    let mut signals = announce(pid_path)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let reload_config = Arc::new(AtomicBool::new(false));
    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
    let focus = server.focus();

    let shutdown_clone = Arc::clone(&shutdown);
    let reload_clone = Arc::clone(&reload_config);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = signals.trigger.recv() => {
                    debug!("Received SIGUSR1");
                    if trigger_tx.try_send(()).is_err() {
                        debug!("Trigger queue full, coalescing");
                    }
                }
                _ = signals.focus.recv() => {
                    let focused = !focus.is_focused();
                    focus.set(focused);
                    info!(focused = focused, "Received SIGUSR2, focus toggled");
                }
                _ = signals.terminate.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                    shutdown_clone.store(true, Ordering::SeqCst);
                    break;
                }
                _ = signals.interrupt.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                    shutdown_clone.store(true, Ordering::SeqCst);
                    break;
                }
                _ = signals.hangup.recv() => {
                    info!("Received SIGHUP, marking config for reload");
                    reload_clone.store(true, Ordering::SeqCst);
                }
            }
        }
    });

    server.run(trigger_rx, shutdown, reload_config).await
}

async fn invoke(
    config: CommandServerConfig,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    args: InvokeArgs,
) -> Result<()> {
    let options = HostOptions {
        document: args.document,
        focused: !args.inactive,
    };
    let server = HostServer::activate(config, config_path, overrides, &options)?;

    match server.invoke_once().await {
        Ok(outcome) => {
            info!(
                command_id = %outcome.command_id,
                success = outcome.response.is_success(),
                "Response written"
            );
            Ok(())
        }
        Err(e) if e.is_benign() => {
            info!(reason = %e, "No response written");
            Ok(())
        }
        Err(e) => Err(e).context("Invocation failed"),
    }
}

async fn send(config: CommandServerConfig, args: SendArgs) -> Result<()> {
    let dir = config.communication_dir();
    guard::validate(dir.path())
        .with_context(|| format!("Refusing to write to {:?}", dir.path()))?;

    let pid = match args.pid {
        Some(pid) => pid,
        None => read_pid_file(&default_pid_path(&dir))?,
    };

    let request = Request::new(
        args.command_id,
        args.args.iter().map(|raw| parse_arg(raw)).collect(),
    )
    .with_return_output(args.return_output)
    .with_wait_for_finish(args.wait);

    let client = CommandClient::new(Arc::new(FsMailbox::new(dir)))
        .with_response_timeout(config.response_timeout)
        .with_poll_interval(config.poll_interval);
    let response = client
        .send(&request, &SignalTrigger::new(pid)?)
        .await
        .context("Host did not answer")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if let Some(ref message) = response.error {
        anyhow::bail!("Command failed: {message}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let overrides = cli.overrides();
    let config = load_configuration(cli.config.clone(), &overrides)?;

    match cli.command {
        HostCommand::Path => {
            println!("{}", config.communication_dir().path().display());
            Ok(())
        }
        HostCommand::Serve(args) => {
            let config_path = cli.config.or_else(default_config_path);
            serve(config, config_path, overrides, args)
        }
        HostCommand::Invoke(args) => {
            let config_path = cli.config.or_else(default_config_path);
            runtime()?.block_on(invoke(config, config_path, overrides, args))
        }
        HostCommand::Send(args) => runtime()?.block_on(send(config, args)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use command_server_core::Trigger;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("3"), json!(3));
        assert_eq!(parse_arg("-1"), json!(-1));
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_arg("hello"), json!("hello"));
        assert_eq!(parse_arg(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn test_send_arguments() {
        let cli = Cli::try_parse_from([
            "command-server",
            "send",
            "editor.selectLineRange",
            "2",
            "-5",
            "--return-output",
            "--pid",
            "1234",
        ])
        .unwrap();

        let HostCommand::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.command_id, "editor.selectLineRange");
        assert_eq!(args.args, vec!["2", "-5"]);
        assert!(args.return_output);
        assert!(!args.wait);
        assert_eq!(args.pid, Some(1234));
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::try_parse_from([
            "command-server",
            "path",
            "--service-name",
            "voice",
            "--staleness-ms",
            "500",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.service_name.as_deref(), Some("voice"));
        assert_eq!(overrides.staleness_threshold_ms, Some(500));
        assert!(overrides.temp_root.is_none());
    }

    #[test]
    fn test_send_rejects_group_pids() {
        for pid in ["0", "-1"] {
            let result = Cli::try_parse_from([
                "command-server",
                "send",
                "editor.getFileName",
                "--pid",
                pid,
            ]);
            assert!(result.is_err(), "--pid {pid} should be rejected");
        }
    }

    #[test]
    fn test_invoke_documents_detached_commands() {
        let cli = Cli::command();
        let invoke = cli.find_subcommand("invoke").unwrap();
        let help = invoke.get_long_about().unwrap().to_string();
        assert!(help.contains("fire-and-forget"));
    }

    #[test]
    fn test_command_line_fixes_invalid_file_value() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[protocol]\nstaleness_threshold_ms = 0\n").unwrap();

        assert!(load_configuration(Some(path.clone()), &ConfigOverrides::new()).is_err());

        let overrides = ConfigOverrides {
            staleness_threshold_ms: Some(250),
            ..ConfigOverrides::default()
        };
        let config = load_configuration(Some(path), &overrides).unwrap();
        assert_eq!(config.staleness_threshold.as_millis(), 250);
    }

    #[tokio::test]
    async fn test_pid_file_appears_after_handlers() {
        let temp = tempfile::TempDir::new().unwrap();
        let pid_path = temp.path().join("host.pid");

        let mut signals = announce(&pid_path).unwrap();
        let pid = read_pid_file(&pid_path).unwrap();
        assert_eq!(pid, std::process::id() as i32);

        SignalTrigger::new(pid).unwrap().fire().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), signals.trigger.recv())
            .await
            .unwrap();
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let result = load_configuration(
            Some(PathBuf::from("/nonexistent/command-server.toml")),
            &ConfigOverrides::new(),
        );
        assert!(result.is_err());
    }
}
