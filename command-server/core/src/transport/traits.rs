//! Transport Traits
//!
//! The mailbox abstraction over the two well-known files in the
//! communication directory. The host side reads the request and claims the
//! response slot; the client side writes the request and collects the
//! response. Keeping both halves behind one trait lets tests swap the real
//! filesystem for [`MemoryMailbox`](super::MemoryMailbox).

use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error from the underlying files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The response slot already exists; another responder owns it
    #[error("Response slot is already taken")]
    SlotTaken,

    /// Message serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Request payload exceeds the accepted size
    #[error("Request too large: {size} bytes (max: {max})")]
    RequestTooLarge {
        /// Size of the payload that was read
        size: usize,
        /// Maximum accepted size
        max: usize,
    },
}

/// Single-slot mailbox shared by the client and the host
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Last-modified time of the request
    async fn request_modified(&self) -> Result<SystemTime, TransportError>;

    /// Raw request bytes
    async fn read_request(&self) -> Result<Vec<u8>, TransportError>;

    /// Claim the response slot with create-exclusive semantics
    ///
    /// Returns [`TransportError::SlotTaken`] if a response (complete or not)
    /// already exists. A claimed slot is visible to other responders
    /// immediately, even before anything is committed to it.
    async fn claim_response_slot(&self) -> Result<Box<dyn ResponseSlot>, TransportError>;

    /// Replace the request (client side)
    async fn write_request(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Current response bytes, `None` if there is no response (client side)
    async fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Remove the response if present (client side)
    async fn remove_response(&self) -> Result<(), TransportError>;
}

/// An exclusively claimed response slot
///
/// Consumed by exactly one of [`commit`](ResponseSlot::commit) or
/// [`abandon`](ResponseSlot::abandon).
#[async_trait]
pub trait ResponseSlot: Send {
    /// Write the complete response and close the slot
    async fn commit(self: Box<Self>, bytes: &[u8]) -> Result<(), TransportError>;

    /// Close the slot without writing anything
    ///
    /// The claimed (empty) slot stays in place.
    async fn abandon(self: Box<Self>) -> Result<(), TransportError>;
}
