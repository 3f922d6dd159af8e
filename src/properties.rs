//! # Property Bags
//!
//! Node configuration is stored as a JSON object. The compiler reads it
//! through the typed getters below; each getter distinguishes a missing key
//! (`Ok(None)`) from a malformed one (`Err`).
//!
//! Durations accept three spellings:
//!
//! - a number of milliseconds: `1500`
//! - an ISO-8601 duration: `"PT1.5S"`, `"P1DT2H"`
//! - a clock time span: `"00:00:01.5"`

use crate::error::CompileError;
use crate::workflow::NodeId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::sync::OnceLock;
use std::time::Duration;

/// A malformed property value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyError {
  /// Property name.
  pub property: String,
  /// What is wrong with the value.
  pub reason: String,
}

impl PropertyError {
  fn new(property: &str, reason: impl Into<String>) -> Self {
    Self {
      property: property.to_string(),
      reason: reason.into(),
    }
  }

  /// Attributes the error to a node.
  pub fn at(self, node: &NodeId) -> CompileError {
    CompileError::InvalidProperty {
      node: node.clone(),
      property: self.property,
      reason: self.reason,
    }
  }
}

/// The configurable properties of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(Map<String, Json>);

impl PropertyBag {
  /// Creates an empty bag.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets a property, returning the bag for chaining.
  pub fn with(mut self, key: &str, value: impl Into<Json>) -> Self {
    self.0.insert(key.to_string(), value.into());
    self
  }

  /// Sets a property.
  pub fn insert(&mut self, key: &str, value: impl Into<Json>) {
    self.0.insert(key.to_string(), value.into());
  }

  /// Returns the raw JSON value of a property. `null` counts as missing.
  pub fn get(&self, key: &str) -> Option<&Json> {
    self.0.get(key).filter(|value| !value.is_null())
  }

  /// Returns true when the property is set.
  pub fn contains(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Reads a non-negative integer.
  pub fn get_usize(&self, key: &str) -> Result<Option<usize>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| PropertyError::new(key, format!("expected a non-negative integer, found {}", value))),
    }
  }

  /// Reads a signed integer.
  pub fn get_i64(&self, key: &str) -> Result<Option<i64>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => value
        .as_i64()
        .map(Some)
        .ok_or_else(|| PropertyError::new(key, format!("expected an integer, found {}", value))),
    }
  }

  /// Reads a boolean.
  pub fn get_bool(&self, key: &str) -> Result<Option<bool>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => value
        .as_bool()
        .map(Some)
        .ok_or_else(|| PropertyError::new(key, format!("expected a boolean, found {}", value))),
    }
  }

  /// Reads a string.
  pub fn get_str(&self, key: &str) -> Result<Option<&str>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => value
        .as_str()
        .map(Some)
        .ok_or_else(|| PropertyError::new(key, format!("expected a string, found {}", value))),
    }
  }

  /// Reads a duration.
  pub fn get_duration(&self, key: &str) -> Result<Option<Duration>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(Json::Number(n)) => n
        .as_f64()
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| Some(Duration::from_secs_f64(ms / 1000.0)))
        .ok_or_else(|| PropertyError::new(key, "expected a non-negative number of milliseconds")),
      Some(Json::String(s)) => parse_duration(s)
        .map(Some)
        .ok_or_else(|| PropertyError::new(key, format!("unrecognized duration '{}'", s))),
      Some(other) => Err(PropertyError::new(
        key,
        format!("expected a duration, found {}", other),
      )),
    }
  }

  /// Deserializes a property into any serde type.
  pub fn get_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>, PropertyError> {
    match self.get(key) {
      None => Ok(None),
      Some(value) => serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| PropertyError::new(key, e.to_string())),
    }
  }
}

fn iso_pattern() -> Option<&'static Regex> {
  static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
  PATTERN
    .get_or_init(|| {
      Regex::new(r"^P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$").ok()
    })
    .as_ref()
}

fn clock_pattern() -> Option<&'static Regex> {
  static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
  PATTERN
    .get_or_init(|| Regex::new(r"^(?:(\d+)\.)?(\d{1,2}):(\d{2}):(\d{2}(?:\.\d+)?)$").ok())
    .as_ref()
}

/// Parses an ISO-8601 (`PT1.5S`) or clock (`00:00:01.5`) duration string.
pub fn parse_duration(text: &str) -> Option<Duration> {
  let text = text.trim();
  let capture = |caps: &regex::Captures<'_>, index: usize| -> Option<f64> {
    match caps.get(index) {
      Some(m) => m.as_str().parse::<f64>().ok(),
      None => Some(0.0),
    }
  };
  let seconds = if let Some(caps) = iso_pattern()?.captures(text) {
    if text == "P" || text.ends_with('T') {
      return None;
    }
    capture(&caps, 1)? * 86_400.0 + capture(&caps, 2)? * 3_600.0 + capture(&caps, 3)? * 60.0 + capture(&caps, 4)?
  } else if let Some(caps) = clock_pattern()?.captures(text) {
    capture(&caps, 1)? * 86_400.0 + capture(&caps, 2)? * 3_600.0 + capture(&caps, 3)? * 60.0 + capture(&caps, 4)?
  } else {
    return None;
  };
  Some(Duration::from_secs_f64(seconds))
}
