//! Protocol Messages
//!
//! The two values exchanged through the communication directory: the
//! [`Request`] written by the external client and the [`Response`] written by
//! the host. Both are plain JSON objects with camelCase keys so that clients
//! written in other languages can produce and consume them without a schema.
//!
//! # Wire Shapes
//!
//! ```text
//! request.json   {"commandId": "...", "uuid": "...", "args": [...],
//!                 "returnCommandOutput": false, "waitForFinish": false}
//!
//! response.json  {"returnValue": ..., "uuid": "...", "error": null,
//!                 "warnings": []}\n
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command invocation written by the external client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Identifier of the operation to invoke (opaque to the protocol)
    pub command_id: String,

    /// Correlation token echoed verbatim in the response
    pub uuid: String,

    /// Positional arguments passed to the operation
    #[serde(default)]
    pub args: Vec<Value>,

    /// Await the operation and capture its result
    ///
    /// Takes priority over `wait_for_finish`.
    #[serde(default)]
    pub return_command_output: bool,

    /// Await the operation but discard its result
    ///
    /// Some operations (quick pickers, prompts) block until the user reacts,
    /// so clients leave this off for them.
    #[serde(default)]
    pub wait_for_finish: bool,
}

impl Request {
    /// Create a fire-and-forget request with a fresh correlation token
    pub fn new(command_id: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command_id: command_id.into(),
            uuid: uuid::Uuid::new_v4().to_string(),
            args,
            return_command_output: false,
            wait_for_finish: false,
        }
    }

    /// Ask the host to capture the operation's return value
    #[must_use]
    pub fn with_return_output(mut self, enabled: bool) -> Self {
        self.return_command_output = enabled;
        self
    }

    /// Ask the host to wait for the operation to finish
    #[must_use]
    pub fn with_wait_for_finish(mut self, enabled: bool) -> Self {
        self.wait_for_finish = enabled;
        self
    }

    /// How the engine should treat the dispatched operation
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        if self.return_command_output {
            WaitPolicy::CaptureOutput
        } else if self.wait_for_finish {
            WaitPolicy::AwaitCompletion
        } else {
            WaitPolicy::FireAndForget
        }
    }
}

/// What the engine does with a dispatched operation before responding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Await completion and store the result in `returnValue`
    CaptureOutput,
    /// Await completion, drop the result
    AwaitCompletion,
    /// Respond right after dispatch; completion is never observed
    FireAndForget,
}

/// The host's answer to a [`Request`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Captured result, when one was requested and produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,

    /// Correlation token copied from the request
    pub uuid: String,

    /// Failure message, `None` on success
    pub error: Option<String>,

    /// Advisory messages for the client
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Response {
    /// Create an empty, successful response for the given correlation token
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            return_value: None,
            uuid: uuid.into(),
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Store a captured value
    ///
    /// JSON `null` is stored as "no value" so that the serialized form
    /// (`returnValue` omitted) parses back to the same response.
    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = if value.is_null() { None } else { Some(value) };
    }

    /// Record the failure message
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Append an advisory message
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Whether the operation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_parses_client_json() {
        let raw = r#"{"commandId":"x","uuid":"abc","args":[1,2],"returnCommandOutput":true,"waitForFinish":false}"#;
        let request: Request = serde_json::from_str(raw).unwrap();

        assert_eq!(request.command_id, "x");
        assert_eq!(request.uuid, "abc");
        assert_eq!(request.args, vec![json!(1), json!(2)]);
        assert!(request.return_command_output);
        assert!(!request.wait_for_finish);
    }

    #[test]
    fn test_request_optional_fields_default() {
        let request: Request = serde_json::from_str(r#"{"commandId":"x","uuid":"u"}"#).unwrap();

        assert!(request.args.is_empty());
        assert_eq!(request.wait_policy(), WaitPolicy::FireAndForget);
    }

    #[test]
    fn test_request_requires_uuid() {
        let result = serde_json::from_str::<Request>(r#"{"commandId":"x","args":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_wait_policy_priority() {
        let base = Request::new("x", vec![]);

        assert_eq!(base.wait_policy(), WaitPolicy::FireAndForget);
        assert_eq!(
            base.clone().with_wait_for_finish(true).wait_policy(),
            WaitPolicy::AwaitCompletion
        );
        assert_eq!(
            base.clone().with_return_output(true).wait_policy(),
            WaitPolicy::CaptureOutput
        );
        assert_eq!(
            base.with_return_output(true)
                .with_wait_for_finish(true)
                .wait_policy(),
            WaitPolicy::CaptureOutput
        );
    }

    #[test]
    fn test_new_request_tokens_are_unique() {
        let a = Request::new("x", vec![]);
        let b = Request::new("x", vec![]);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_response_shape() {
        let mut response = Response::new("abc");
        response.set_return_value(json!(42));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({"returnValue": 42, "uuid": "abc", "error": null, "warnings": []})
        );
    }

    #[test]
    fn test_response_without_value_omits_field() {
        let mut response = Response::new("abc");
        response.set_error("boom");

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("returnValue").is_none());
        assert_eq!(value["error"], json!("boom"));
        assert!(!response.is_success());
    }

    #[test]
    fn test_null_return_value_is_absent() {
        let mut response = Response::new("abc");
        response.set_return_value(Value::Null);
        assert_eq!(response.return_value, None);
    }
}
