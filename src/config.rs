use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables of the runtime and the rule service.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let config = ruleflow::RuntimeConfig::from_json(r#"{"max_page_size": 20}"#).unwrap();
/// assert_eq!(config.max_page_size, 20);
/// assert_eq!(config.fire_timeout_ms, Some(5000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Wall-clock bound on one firing pass. `None` disables the bound.
    pub fire_timeout_ms: Option<u64>,
    /// Return the underlying failure text to callers instead of a generic message.
    pub expose_failure_detail: bool,
    /// Compile-check rule text before it is persisted.
    pub verify_before_save: bool,
    pub max_page_size: u32,
    /// Properties visible to rules under `context.`.
    pub context: Map<String, JsonValue>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fire_timeout_ms: Some(5000),
            expose_failure_detail: false,
            verify_before_save: true,
            max_page_size: 100,
            context: Map::new(),
        }
    }
}

impl RuntimeConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub(crate) fn fire_deadline(&self) -> Option<Instant> {
        self.fire_timeout_ms
            .and_then(|ms| Instant::now().checked_add(Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(RuntimeConfig::from_json("{}").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn null_timeout_disables_deadline() {
        let config = RuntimeConfig::from_json(r#"{"fire_timeout_ms": null}"#).unwrap();
        assert_eq!(config.fire_timeout_ms, None);
        assert!(config.fire_deadline().is_none());
        assert!(RuntimeConfig::default().fire_deadline().is_some());
    }

    #[test]
    fn context_properties_load() {
        let config =
            RuntimeConfig::from_json(r#"{"context": {"region": "eu", "limit": 3}}"#).unwrap();
        assert_eq!(config.context.get("region"), Some(&json!("eu")));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{"max_page_size": "many"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RuntimeConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
