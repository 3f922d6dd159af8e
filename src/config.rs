//! Engine configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Settings shared by the compiler and the executions it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Name given to compiled pipelines when the workflow has none.
  pub name: String,
  /// Maximum depth of nested workflows.
  pub max_nesting_depth: usize,
  /// Log every element delivered to an observer at `trace` level.
  pub trace_elements: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      name: "workflow".to_string(),
      max_nesting_depth: 32,
      trace_elements: false,
    }
  }
}

impl EngineConfig {
  /// Parses and validates a JSON configuration document. Missing keys take
  /// their default value.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: EngineConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks that every setting is within its supported range.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_nesting_depth == 0 {
      return Err(ConfigError::Invalid {
        key: "max_nesting_depth".to_string(),
        reason: "must be at least 1".to_string(),
      });
    }
    Ok(())
  }
}
