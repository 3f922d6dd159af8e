//! # Built-in Operators
//!
//! The catalog of operator kinds every [`OperatorRegistry`] created with
//! [`OperatorRegistry::with_builtins`] knows about.
//!
//! Leaf operators are [`OverloadSet`](crate::resolver::OverloadSet)s and go
//! through the type resolver. Workflow-valued operators own a nested
//! sub-graph and implement [`OperatorDescriptor`](crate::operator::OperatorDescriptor)
//! directly.

pub mod aggregate;
pub mod arithmetic;
pub mod buffer;
pub mod combine;
pub mod gate;
pub mod group;
pub mod recovery;
pub mod source;
pub mod transform;
pub mod workflow;

use crate::error::CompileError;
pub use crate::error::Origin;
use crate::properties::{PropertyBag, PropertyError};
use crate::registry::OperatorRegistry;
use crate::sequence::Sequence;
use crate::workflow::Node;

/// Registers the whole built-in catalog.
pub fn register_builtins(registry: &mut OperatorRegistry) {
  source::register(registry);
  transform::register(registry);
  group::register(registry);
  aggregate::register(registry);
  arithmetic::register(registry);
  combine::register(registry);
  buffer::register(registry);
  recovery::register(registry);
  gate::register(registry);
  workflow::register(registry);
  registry.alias("TriggeredBuffer", "BufferTrigger");
}

/// The first input of a stage, or an empty sequence.
pub(crate) fn first(inputs: Vec<Sequence>) -> Sequence {
  inputs.into_iter().next().unwrap_or_else(Sequence::empty)
}

/// Reads an optional property of `node`.
pub(crate) fn optional<'n, T>(
  node: &'n Node,
  read: impl FnOnce(&'n PropertyBag) -> Result<Option<T>, PropertyError>,
) -> Result<Option<T>, CompileError> {
  read(&node.properties).map_err(|error| error.at(&node.id))
}

/// Reads a property of `node` that must be present.
pub(crate) fn required<'n, T>(
  node: &'n Node,
  key: &str,
  read: impl FnOnce(&'n PropertyBag) -> Result<Option<T>, PropertyError>,
) -> Result<T, CompileError> {
  optional(node, read)?.ok_or_else(|| invalid_property(node, key, "property is required"))
}

pub(crate) fn invalid_property(node: &Node, key: &str, reason: impl Into<String>) -> CompileError {
  CompileError::InvalidProperty {
    node: node.id.clone(),
    property: key.to_string(),
    reason: reason.into(),
  }
}
