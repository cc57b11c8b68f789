use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Outcome of one rule invocation.
///
/// Serializes as `{"code": 0|1, "message"?: ..., "data"?: ...}`; `code` 0 is
/// success, 1 is failure with `message` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct ExecutionResult {
    code: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
}

impl ExecutionResult {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;

    pub fn success() -> Self {
        Self {
            code: Self::SUCCESS,
            message: None,
            data: None,
        }
    }

    pub fn success_with(data: JsonValue) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: Self::FAILURE,
            message: Some(message.into()),
            data: None,
        }
    }

    #[must_use]
    pub fn code(&self) -> u8 {
        self.code
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }

    /// Put `key` into the payload, turning the payload into an object if it is
    /// not one already.
    pub fn put(&mut self, key: impl Into<String>, value: JsonValue) {
        if !matches!(self.data, Some(JsonValue::Object(_))) {
            self.data = Some(JsonValue::Object(serde_json::Map::new()));
        }
        if let Some(JsonValue::Object(map)) = &mut self.data {
            map.insert(key.into(), value);
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.code = Self::FAILURE;
        self.message = Some(message.into());
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={}", self.code)?;
        if let Some(message) = &self.message {
            write!(f, ", message={message}")?;
        }
        if let Some(data) = &self.data {
            write!(f, ", data={data}")?;
        }
        Ok(())
    }
}

/// Shared handle to the result accumulator inserted into a session.
///
/// The runtime keeps one clone and reads the final state after firing; the
/// session mutates it through the other.
#[derive(Debug, Clone, Default)]
pub struct ResultHandle(Arc<Mutex<ExecutionResult>>);

impl ResultHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut ExecutionResult)) {
        f(&mut self.0.lock());
    }

    pub fn snapshot(&self) -> ExecutionResult {
        self.0.lock().clone()
    }
}
