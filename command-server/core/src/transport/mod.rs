//! Transport Layer for Client-Host IPC
//!
//! The protocol uses a shared directory as a single-slot mailbox:
//! - `resolver`: where the directory lives
//! - `guard`: whether it is safe to use
//! - `frame`: what the two files contain
//! - `FsMailbox` / `MemoryMailbox`: how they are read and written
//!
//! # Security
//!
//! - The directory is owner-only (0700) and re-validated at each activation
//! - The response file is created exclusively with 0600 permissions
//! - No sockets, no network exposure

pub mod frame;
pub mod fs_mailbox;
pub mod guard;
pub mod in_memory;
pub mod resolver;
pub mod traits;

// Re-exports for convenience
pub use frame::{
    decode_request, decode_response, encode_request, encode_response, MAX_REQUEST_SIZE,
    RESPONSE_TERMINATOR,
};
pub use fs_mailbox::FsMailbox;
pub use guard::GuardError;
pub use in_memory::MemoryMailbox;
pub use resolver::{
    resolve, CommunicationDir, FixedPaths, PathProvider, SystemPaths, REQUEST_FILE_NAME,
    RESPONSE_FILE_NAME,
};
pub use traits::{Mailbox, ResponseSlot, TransportError};
