//! Protocol Client
//!
//! The external-writer half of the protocol, as an automation client runs
//! it:
//!
//! 1. Remove any leftover response (including an empty slot abandoned after
//!    a malformed request)
//! 2. Write the request
//! 3. Fire the host-specific trigger
//! 4. Poll until a response ending in the completion marker appears
//! 5. Remove the response and check its correlation token
//!
//! No response within the timeout means the host is unavailable, inactive,
//! or hit an unrecoverable error; a response with an `error` means the
//! operation itself failed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::messages::{Request, Response};
use crate::transport::{decode_response, encode_request, Mailbox, TransportError};

/// Default time to wait for a response, matching the host's staleness window
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default interval between response polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors seen by the client
#[derive(Debug, Error)]
pub enum ClientError {
    /// No complete response appeared in time
    #[error("No response after {waited_ms} ms")]
    Timeout {
        /// How long the client waited
        waited_ms: u128,
    },

    /// The response answers a different request
    #[error("Response uuid {actual} does not match request uuid {expected}")]
    UuidMismatch {
        /// Token sent
        expected: String,
        /// Token received
        actual: String,
    },

    /// Reading or writing the mailbox failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The host could not be signalled
    #[error("Failed to trigger host: {0}")]
    Trigger(String),
}

/// Host-specific activation that makes the host read the request
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Signal the host
    async fn fire(&self) -> Result<(), ClientError>;
}

/// Trigger for hosts that are activated out of band
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTrigger;

#[async_trait]
impl Trigger for NoopTrigger {
    async fn fire(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Writes requests and collects responses through a mailbox
pub struct CommandClient {
    mailbox: Arc<dyn Mailbox>,
    response_timeout: Duration,
    poll_interval: Duration,
}

impl CommandClient {
    /// Create a client with default timing
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the response timeout
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    ///
    /// `Timeout` if nothing complete arrives in time, `UuidMismatch` if the
    /// response belongs to another request, or mailbox/trigger failures.
    pub async fn send(
        &self,
        request: &Request,
        trigger: &dyn Trigger,
    ) -> Result<Response, ClientError> {
        self.mailbox.remove_response().await?;
        self.mailbox.write_request(&encode_request(request)?).await?;
        tracing::debug!(command_id = %request.command_id, uuid = %request.uuid, "Request written");

        trigger.fire().await?;

        let response = self.await_response().await?;
        if response.uuid != request.uuid {
            return Err(ClientError::UuidMismatch {
                expected: request.uuid.clone(),
                actual: response.uuid,
            });
        }
        Ok(response)
    }

    async fn await_response(&self) -> Result<Response, ClientError> {
        let started = Instant::now();
        let deadline = started + self.response_timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(bytes) = self.mailbox.read_response().await? {
                if let Some(response) = decode_response(&bytes)? {
                    self.mailbox.remove_response().await?;
                    return Ok(response);
                }
            }

            if Instant::now() >= deadline {
                tracing::debug!(timeout = ?self.response_timeout, "Gave up waiting for response");
                return Err(ClientError::Timeout {
                    waited_ms: started.elapsed().as_millis(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProtocolEngine;
    use crate::executor::CommandRegistry;
    use crate::transport::{encode_response, MemoryMailbox};
    use serde_json::json;

    /// Trigger that runs an in-process engine, like a host reacting to a signal
    struct EngineTrigger(ProtocolEngine);

    #[async_trait]
    impl Trigger for EngineTrigger {
        async fn fire(&self) -> Result<(), ClientError> {
            self.0
                .handle_invocation()
                .await
                .map(|_| ())
                .map_err(|e| ClientError::Trigger(e.to_string()))
        }
    }

    /// Trigger that answers with a fixed response
    struct CannedTrigger {
        mailbox: MemoryMailbox,
        response: Response,
    }

    #[async_trait]
    impl Trigger for CannedTrigger {
        async fn fire(&self) -> Result<(), ClientError> {
            self.mailbox
                .put_response(encode_response(&self.response).unwrap());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let mailbox = MemoryMailbox::new();
        let registry = CommandRegistry::new();
        registry.register_sync("x", |_| Ok(json!(42)));

        let trigger = EngineTrigger(ProtocolEngine::new(
            Arc::new(mailbox.clone()),
            Arc::new(registry),
        ));
        let client = CommandClient::new(Arc::new(mailbox.clone()));
        let request = Request::new("x", vec![]).with_return_output(true);

        let response = client.send(&request, &trigger).await.unwrap();

        assert_eq!(response.uuid, request.uuid);
        assert_eq!(response.return_value, Some(json!(42)));
        assert!(!mailbox.has_response());
    }

    #[tokio::test]
    async fn test_send_clears_leftover_response() {
        let mailbox = MemoryMailbox::new();
        mailbox.put_response(Vec::new());

        let registry = CommandRegistry::new();
        registry.register_sync("x", |_| Ok(json!(1)));
        let trigger = EngineTrigger(ProtocolEngine::new(
            Arc::new(mailbox.clone()),
            Arc::new(registry),
        ));
        let client = CommandClient::new(Arc::new(mailbox.clone()));

        let response = client
            .send(&Request::new("x", vec![]), &trigger)
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_timeout_without_host() {
        let mailbox = MemoryMailbox::new();
        let client = CommandClient::new(Arc::new(mailbox))
            .with_response_timeout(Duration::from_millis(30))
            .with_poll_interval(Duration::from_millis(5));

        let err = client
            .send(&Request::new("x", vec![]), &NoopTrigger)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_uuid_mismatch() {
        let mailbox = MemoryMailbox::new();
        let trigger = CannedTrigger {
            mailbox: mailbox.clone(),
            response: Response::new("someone-else"),
        };
        let client = CommandClient::new(Arc::new(mailbox));

        let err = client
            .send(&Request::new("x", vec![]), &trigger)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::UuidMismatch { .. }));
    }

    #[tokio::test]
    async fn test_incomplete_response_times_out() {
        let mailbox = MemoryMailbox::new();
        let request = Request::new("x", vec![]);
        let mut bytes = encode_response(&Response::new(request.uuid.clone())).unwrap();
        bytes.pop();

        struct Partial(MemoryMailbox, Vec<u8>);

        #[async_trait]
        impl Trigger for Partial {
            async fn fire(&self) -> Result<(), ClientError> {
                self.0.put_response(self.1.clone());
                Ok(())
            }
        }

        let client = CommandClient::new(Arc::new(mailbox.clone()))
            .with_response_timeout(Duration::from_millis(30))
            .with_poll_interval(Duration::from_millis(5));
        let err = client
            .send(&request, &Partial(mailbox, bytes))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { .. }));
    }
}
