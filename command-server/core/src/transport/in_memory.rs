//! In-Memory Mailbox
//!
//! A mailbox held entirely in memory, for tests and for embedding the engine
//! where the client lives in the same process. Clones share the same slot,
//! so several engines built on clones race exactly like host instances
//! sharing one directory.
//!
//! # Usage
//!
//! ```ignore
//! let mailbox = MemoryMailbox::new();
//! mailbox.put_request(bytes, SystemTime::now());
//!
//! let engine_a = ProtocolEngine::new(Arc::new(mailbox.clone()), executor.clone());
//! let engine_b = ProtocolEngine::new(Arc::new(mailbox.clone()), executor);
//! ```

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{Mailbox, ResponseSlot, TransportError};

#[derive(Debug, Default)]
struct MailboxState {
    request: Option<StoredRequest>,
    response: Option<Vec<u8>>,
}

#[derive(Debug)]
struct StoredRequest {
    bytes: Vec<u8>,
    modified: SystemTime,
}

/// Mailbox backed by shared memory
#[derive(Clone, Debug, Default)]
pub struct MemoryMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl MemoryMailbox {
    /// Create an empty mailbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a request with an explicit modification time
    pub fn put_request(&self, bytes: impl Into<Vec<u8>>, modified: SystemTime) {
        self.state.lock().request = Some(StoredRequest {
            bytes: bytes.into(),
            modified,
        });
    }

    /// Overwrite the response slot directly
    ///
    /// Simulates a competing writer that got there first.
    pub fn put_response(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().response = Some(bytes.into());
    }

    /// Snapshot of the response slot
    #[must_use]
    pub fn response(&self) -> Option<Vec<u8>> {
        self.state.lock().response.clone()
    }

    /// Whether the response slot is claimed
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.state.lock().response.is_some()
    }
}

fn missing_request() -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::NotFound, "no request"))
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn request_modified(&self) -> Result<SystemTime, TransportError> {
        self.state
            .lock()
            .request
            .as_ref()
            .map(|r| r.modified)
            .ok_or_else(missing_request)
    }

    async fn read_request(&self) -> Result<Vec<u8>, TransportError> {
        self.state
            .lock()
            .request
            .as_ref()
            .map(|r| r.bytes.clone())
            .ok_or_else(missing_request)
    }

    async fn claim_response_slot(&self) -> Result<Box<dyn ResponseSlot>, TransportError> {
        let mut state = self.state.lock();
        if state.response.is_some() {
            return Err(TransportError::SlotTaken);
        }
        state.response = Some(Vec::new());

        Ok(Box::new(MemoryResponseSlot {
            state: Arc::clone(&self.state),
        }))
    }

    async fn write_request(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.put_request(bytes, SystemTime::now());
        Ok(())
    }

    async fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.response())
    }

    async fn remove_response(&self) -> Result<(), TransportError> {
        self.state.lock().response = None;
        Ok(())
    }
}

struct MemoryResponseSlot {
    state: Arc<Mutex<MailboxState>>,
}

#[async_trait]
impl ResponseSlot for MemoryResponseSlot {
    async fn commit(self: Box<Self>, bytes: &[u8]) -> Result<(), TransportError> {
        self.state.lock().response = Some(bytes.to_vec());
        Ok(())
    }

    async fn abandon(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }
}
