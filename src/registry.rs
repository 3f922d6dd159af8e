//! # Operator Registry
//!
//! Maps operator kinds to their descriptors. The built-in catalog is
//! registered by [`OperatorRegistry::with_builtins`]; hosts add their own
//! descriptors with [`OperatorRegistry::register`].

use crate::operator::OperatorDescriptor;
use crate::operators;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Descriptors by kind.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
  descriptors: HashMap<String, Arc<dyn OperatorDescriptor>>,
}

impl OperatorRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in catalog.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    operators::register_builtins(&mut registry);
    registry
  }

  /// Registers `descriptor` under its own kind, replacing any previous
  /// descriptor of that kind.
  pub fn register(&mut self, descriptor: impl OperatorDescriptor + 'static) -> &mut Self {
    self.register_shared(Arc::new(descriptor))
  }

  /// Registers an already shared descriptor.
  pub fn register_shared(&mut self, descriptor: Arc<dyn OperatorDescriptor>) -> &mut Self {
    let kind = descriptor.kind().to_string();
    if self.descriptors.insert(kind.clone(), descriptor).is_some() {
      warn!(kind = %kind, "replaced operator descriptor");
    }
    self
  }

  /// Makes `alias` resolve to the descriptor registered as `kind`.
  ///
  /// Returns false when `kind` is not registered.
  pub fn alias(&mut self, alias: &str, kind: &str) -> bool {
    match self.descriptors.get(kind).cloned() {
      Some(descriptor) => {
        self.descriptors.insert(alias.to_string(), descriptor);
        true
      }
      None => false,
    }
  }

  /// Looks up the descriptor of `kind`.
  pub fn get(&self, kind: &str) -> Option<&Arc<dyn OperatorDescriptor>> {
    self.descriptors.get(kind)
  }

  /// Registered kinds, aliases included, sorted.
  pub fn kinds(&self) -> Vec<&str> {
    let mut kinds: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
    kinds.sort_unstable();
    kinds
  }
}

impl fmt::Debug for OperatorRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OperatorRegistry").field("kinds", &self.kinds()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtins_include_aliases() {
    let registry = OperatorRegistry::with_builtins();
    for kind in ["Scan", "Publish", "Replay", "Condition", "Sink", "Gate", "TriggeredBuffer"] {
      assert!(registry.get(kind).is_some(), "missing {}", kind);
    }
    assert_eq!(
      registry.get("TriggeredBuffer").map(|d| d.kind().to_string()),
      Some("BufferTrigger".to_string())
    );
  }

  #[test]
  fn test_alias_of_unknown_kind_is_rejected() {
    let mut registry = OperatorRegistry::new();
    assert!(!registry.alias("Other", "Missing"));
    assert!(registry.kinds().is_empty());
  }
}
