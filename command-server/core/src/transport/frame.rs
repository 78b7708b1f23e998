//! Wire Format
//!
//! Requests and responses are single JSON documents, UTF-8 encoded. A
//! response is terminated by a newline that marks it complete: the client may
//! poll the file while the host is still writing it, and must ignore anything
//! not yet ending in the marker.
//!
//! ```text
//! request.json   {...JSON...}
//! response.json  {...JSON...}\n
//! ```
//!
//! # Security
//!
//! - Maximum request size is enforced before parsing

use serde::Serialize;

use super::TransportError;
use crate::messages::{Request, Response};

/// Maximum accepted request size (1 MB)
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Byte that marks a response as completely written
pub const RESPONSE_TERMINATOR: u8 = b'\n';

fn to_json<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))
}

/// Encode a request as written by the client
pub fn encode_request(request: &Request) -> Result<Vec<u8>, TransportError> {
    to_json(request)
}

/// Parse request bytes read from the mailbox
///
/// # Errors
///
/// Returns `TransportError::RequestTooLarge` before attempting to parse an
/// oversized payload, and `TransportError::Serialization` for anything that
/// is not a valid request document.
pub fn decode_request(bytes: &[u8]) -> Result<Request, TransportError> {
    if bytes.len() > MAX_REQUEST_SIZE {
        return Err(TransportError::RequestTooLarge {
            size: bytes.len(),
            max: MAX_REQUEST_SIZE,
        });
    }

    serde_json::from_slice(bytes).map_err(|e| TransportError::Serialization(e.to_string()))
}

/// Encode a response, including the completion marker
pub fn encode_response(response: &Response) -> Result<Vec<u8>, TransportError> {
    let mut buf = to_json(response)?;
    buf.push(RESPONSE_TERMINATOR);
    Ok(buf)
}

/// Whether response bytes carry the completion marker
#[must_use]
pub fn is_complete(bytes: &[u8]) -> bool {
    bytes.last() == Some(&RESPONSE_TERMINATOR)
}

/// Parse response bytes
///
/// Returns:
/// - `Ok(Some(response))` for a complete response
/// - `Ok(None)` if the response is still being written (or was abandoned empty)
/// - `Err(...)` if a complete response does not parse
pub fn decode_response(bytes: &[u8]) -> Result<Option<Response>, TransportError> {
    if !is_complete(bytes) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes[..bytes.len() - 1])
        .map(Some)
        .map_err(|e| TransportError::Serialization(e.to_string()))
}
