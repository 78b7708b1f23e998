//! Typed access to positional command arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::CommandError;

/// Positional arguments of one invocation, tagged with the command id
#[derive(Clone, Debug, PartialEq)]
pub struct CommandArgs {
    command: String,
    values: Vec<Value>,
}

impl CommandArgs {
    /// Wrap the raw argument list
    pub fn new(command: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            values,
        }
    }

    /// Argument at `index`; `null` counts as absent
    fn present(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    /// Deserialize a required argument
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, CommandError> {
        match self.present(index) {
            Some(value) => self.convert(value, index, name),
            None => Err(self.invalid(format!("missing argument {index} ({name})"))),
        }
    }

    /// Build an `InvalidArguments` error for this command
    pub fn invalid(&self, message: impl Into<String>) -> CommandError {
        CommandError::InvalidArguments {
            command: self.command.clone(),
            message: message.into(),
        }
    }

    fn convert<T: DeserializeOwned>(
        &self,
        value: &Value,
        index: usize,
        name: &str,
    ) -> Result<T, CommandError> {
        serde_json::from_value(value.clone())
            .map_err(|e| self.invalid(format!("argument {index} ({name}): {e}")))
    }
}
