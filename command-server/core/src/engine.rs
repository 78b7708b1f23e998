//! Protocol Engine
//!
//! Handles one external trigger: checks that the request is fresh, claims
//! the response slot, parses the request, dispatches it, and writes exactly
//! one response.
//!
//! # Invocation States
//!
//! ```text
//! Idle ─► StalenessChecked ─► SlotAcquired ─► RequestParsed ─► Dispatched ─► ResponseWritten
//!              │                    │
//!              └──── stale ─────────┴──── slot taken / malformed ───► Failed
//! ```
//!
//! Only `ResponseWritten` leaves a response behind. A stale request and a
//! lost slot race write nothing. A malformed request leaves the claimed,
//! empty response file in place. Failures of the operation itself are never
//! `Failed`: they are reported inside an otherwise normal response.
//!
//! # Ordering
//!
//! The slot is claimed strictly before the request is parsed or dispatched,
//! so among several host instances racing on one directory at most one ever
//! runs the operation.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::executor::{CommandError, CommandExecutor, CommandFuture};
use crate::messages::{Request, Response, WaitPolicy};
use crate::transport::{decode_request, encode_response, Mailbox, TransportError};

/// Default allowed skew between request authorship and handling
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_millis(3000);

/// Warning attached when the host is not the focused instance
pub const NOT_FOCUSED_WARNING: &str = "This host instance is not active";

/// Where an invocation ended up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationState {
    /// Nothing has happened yet
    Idle,
    /// The request is fresh
    StalenessChecked,
    /// This instance owns the response slot
    SlotAcquired,
    /// The request parsed
    RequestParsed,
    /// The operation was started
    Dispatched,
    /// The response was committed
    ResponseWritten,
    /// The invocation was abandoned
    Failed,
}

/// Reasons an invocation ends without a response
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request's timestamp is too far from now
    #[error("Request is stale: modified {skew_ms} ms from now (threshold {threshold_ms} ms)")]
    Stale {
        /// Distance between the request's mtime and now
        skew_ms: u128,
        /// Configured threshold
        threshold_ms: u128,
    },

    /// Another instance already owns the response slot
    #[error("Another instance is handling this request")]
    SlotTaken,

    /// The request could not be parsed; the claimed slot was left empty
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Reading or writing the mailbox failed
    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl EngineError {
    /// Whether this is an expected, silent outcome rather than a fault
    ///
    /// Stale requests and lost slot races are normal when several host
    /// instances share a directory or a client gave up.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::SlotTaken)
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SlotTaken => Self::SlotTaken,
            other => Self::Transport(other),
        }
    }
}

/// Result of an invocation that wrote a response
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationOutcome {
    /// The committed response
    pub response: Response,
    /// The command that was dispatched
    pub command_id: String,
    /// How the operation was awaited
    pub wait_policy: WaitPolicy,
}

/// Whether this host instance currently has the user's focus
pub trait FocusProbe: Send + Sync {
    /// `true` if focused
    fn is_focused(&self) -> bool;
}

/// Focus probe for hosts without a notion of focus
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysFocused;

impl FocusProbe for AlwaysFocused {
    fn is_focused(&self) -> bool {
        true
    }
}

/// Focus flag flipped by the host
#[derive(Clone, Debug)]
pub struct FocusFlag(Arc<AtomicBool>);

impl FocusFlag {
    /// Create a flag with the given initial state
    #[must_use]
    pub fn new(focused: bool) -> Self {
        Self(Arc::new(AtomicBool::new(focused)))
    }

    /// Update the flag
    pub fn set(&self, focused: bool) {
        self.0.store(focused, Ordering::SeqCst);
    }
}

impl FocusProbe for FocusFlag {
    fn is_focused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reads requests from a mailbox and answers them through an executor
pub struct ProtocolEngine {
    mailbox: Arc<dyn Mailbox>,
    executor: Arc<dyn CommandExecutor>,
    focus: Arc<dyn FocusProbe>,
    staleness_threshold: Duration,
    last_state: Mutex<InvocationState>,
}

impl ProtocolEngine {
    /// Create an engine with the default threshold and no focus tracking
    pub fn new(mailbox: Arc<dyn Mailbox>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            mailbox,
            executor,
            focus: Arc::new(AlwaysFocused),
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            last_state: Mutex::new(InvocationState::Idle),
        }
    }

    /// Use a focus probe for the not-active warning
    #[must_use]
    pub fn with_focus(mut self, focus: Arc<dyn FocusProbe>) -> Self {
        self.focus = focus;
        self
    }

    /// Override the staleness threshold
    #[must_use]
    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }

    /// Configured staleness threshold
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// State the most recent invocation ended in
    #[must_use]
    pub fn last_state(&self) -> InvocationState {
        *self.last_state.lock()
    }

    fn advance(&self, state: InvocationState) {
        tracing::trace!(?state, "Invocation state");
        *self.last_state.lock() = state;
    }

    /// Handle one trigger
    ///
    /// # Errors
    ///
    /// Returns an error (and writes nothing) for a stale request, a lost slot
    /// race, a malformed request, or a mailbox failure. Failures of the
    /// dispatched operation are not errors here; they are reported in the
    /// response.
    pub async fn handle_invocation(&self) -> Result<InvocationOutcome, EngineError> {
        self.advance(InvocationState::Idle);
        let result = self.run().await;
        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    command_id = %outcome.command_id,
                    uuid = %outcome.response.uuid,
                    success = outcome.response.is_success(),
                    "Response written"
                );
            }
            Err(e) => {
                self.advance(InvocationState::Failed);
                if e.is_benign() {
                    tracing::debug!(error = %e, "Invocation skipped");
                } else {
                    tracing::error!(error = %e, "Invocation failed");
                }
            }
        }
        result
    }

    async fn run(&self) -> Result<InvocationOutcome, EngineError> {
        self.check_staleness().await?;
        self.advance(InvocationState::StalenessChecked);

        let slot = self.mailbox.claim_response_slot().await?;
        self.advance(InvocationState::SlotAcquired);

        let request = match self.read_request().await {
            Ok(request) => request,
            Err(e) => {
                if let Err(close_err) = slot.abandon().await {
                    tracing::warn!(error = %close_err, "Failed to close response slot");
                }
                return Err(e);
            }
        };
        self.advance(InvocationState::RequestParsed);

        let wait_policy = request.wait_policy();
        let mut response = Response::new(request.uuid.clone());
        if !self.focus.is_focused() {
            response.push_warning(NOT_FOCUSED_WARNING);
        }

        let command_id = request.command_id;
        let dispatched = self.executor.dispatch(&command_id, request.args);
        self.advance(InvocationState::Dispatched);
        match dispatched {
            Ok(operation) => {
                apply_wait_policy(&command_id, operation, wait_policy, &mut response).await;
            }
            Err(e) => response.set_error(e.to_string()),
        }

        let bytes = encode_response(&response)?;
        slot.commit(&bytes).await?;
        self.advance(InvocationState::ResponseWritten);

        Ok(InvocationOutcome {
            response,
            command_id,
            wait_policy,
        })
    }

    async fn check_staleness(&self) -> Result<(), EngineError> {
        let modified = self.mailbox.request_modified().await?;
        let skew = skew(SystemTime::now(), modified);
        if skew > self.staleness_threshold {
            return Err(EngineError::Stale {
                skew_ms: skew.as_millis(),
                threshold_ms: self.staleness_threshold.as_millis(),
            });
        }
        Ok(())
    }

    async fn read_request(&self) -> Result<Request, EngineError> {
        let bytes = self.mailbox.read_request().await?;
        decode_request(&bytes).map_err(|e| EngineError::MalformedRequest(e.to_string()))
    }
}

/// Absolute distance between two instants, in either direction
fn skew(now: SystemTime, modified: SystemTime) -> Duration {
    match now.duration_since(modified) {
        Ok(age) => age,
        Err(e) => e.duration(),
    }
}

async fn apply_wait_policy(
    command_id: &str,
    operation: CommandFuture,
    policy: WaitPolicy,
    response: &mut Response,
) {
    match policy {
        WaitPolicy::CaptureOutput => match run_caught(operation).await {
            Ok(value) => response.set_return_value(value),
            Err(e) => response.set_error(e.to_string()),
        },
        WaitPolicy::AwaitCompletion => {
            if let Err(e) = run_caught(operation).await {
                response.set_error(e.to_string());
            }
        }
        WaitPolicy::FireAndForget => {
            let command_id = command_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = run_caught(operation).await {
                    tracing::debug!(command_id = %command_id, error = %e, "Detached command failed");
                }
            });
        }
    }
}

/// Await an operation, turning a panic into an error
async fn run_caught(operation: CommandFuture) -> Result<Value, CommandError> {
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "command panicked".to_string());
            Err(CommandError::Failed(message))
        }
    }
}
