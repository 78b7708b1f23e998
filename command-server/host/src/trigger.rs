//! Signal-based trigger and PID file handling
//!
//! A host announces itself with a PID file in the communication directory.
//! Clients wake it with `SIGUSR1` after writing a request.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use command_server_core::transport::CommunicationDir;
use command_server_core::{ClientError, Trigger};

/// PID file name inside the communication directory
pub const PID_FILE_NAME: &str = "host.pid";

/// Default PID file for hosts serving `dir`
pub fn default_pid_path(dir: &CommunicationDir) -> PathBuf {
    dir.path().join(PID_FILE_NAME)
}

/// Wakes a host process with `SIGUSR1`
#[derive(Clone, Copy, Debug)]
pub struct SignalTrigger {
    pid: Pid,
}

impl SignalTrigger {
    /// Trigger the process with this id
    ///
    /// # Errors
    ///
    /// Fails for ids that `kill(2)` would read as a process group or as
    /// "every process".
    pub fn new(pid: i32) -> Result<Self> {
        Ok(Self {
            pid: host_pid(pid)?,
        })
    }
}

/// A single-process id; zero and negative ids address groups
fn host_pid(raw: i32) -> Result<Pid> {
    if raw <= 0 {
        anyhow::bail!("Invalid host PID {raw}: must be a positive process id");
    }
    Ok(Pid::from_raw(raw))
}

#[async_trait]
impl Trigger for SignalTrigger {
    async fn fire(&self) -> Result<(), ClientError> {
        debug!(pid = %self.pid, "Signalling host");
        kill(self.pid, Signal::SIGUSR1)
            .map_err(|e| ClientError::Trigger(format!("SIGUSR1 to {}: {e}", self.pid)))
    }
}

/// Whether a process with this id is running
pub fn is_running(pid: i32) -> bool {
    host_pid(pid).is_ok_and(|pid| kill(pid, None).is_ok())
}

/// Read the host PID from a PID file
pub fn read_pid_file(path: &Path) -> Result<i32> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PID file {path:?}; is a host serving?"))?;
    let pid: i32 = contents
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in {path:?}"))?;
    host_pid(pid).with_context(|| format!("Invalid PID in {path:?}"))?;
    Ok(pid)
}

/// Write the current PID
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove the PID file
pub fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Fail if a live host already owns the PID file; clear a stale one
pub fn check_existing_host(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let pid = read_pid_file(path)?;
    if is_running(pid) {
        anyhow::bail!(
            "Another host is already serving with this PID file (PID: {pid}). \
             Use --pid-file for an additional instance, or remove {path:?} if it's stale."
        );
    }

    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(path)?;
    Ok(())
}
