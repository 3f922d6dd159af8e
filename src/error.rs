//! # Error Handling
//!
//! Two disjoint error classes:
//!
//! - **CompileError**: raised while turning a [`Workflow`](crate::workflow::Workflow)
//!   into a [`Pipeline`](crate::pipeline::Pipeline). Compilation aborts on the
//!   first error and no partial pipeline is produced.
//! - **StreamError**: raised while a pipeline runs. A stream carries at most
//!   one error item and ends right after it; the error reaches the observer of
//!   the execution exactly once.
//!
//! `StreamError` keeps rich context about where the failure happened
//! ([`ErrorContext`], [`ComponentInfo`]) so that failures deep inside nested
//! sub-graphs can still be attributed to the operator that raised them.

use crate::types::{ElementType, display_types};
use crate::value::Value;
use crate::workflow::{Node, NodeId};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while compiling a workflow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
  /// No overload of the operator accepts the input types.
  #[error("node {node}: no overload of {kind} accepts inputs {}", display_types(.inputs))]
  NoMatchingOverload {
    /// The failing node.
    node: NodeId,
    /// Operator kind.
    kind: String,
    /// The concrete input types.
    inputs: Vec<ElementType>,
  },
  /// Several overloads match and none is strictly better.
  #[error("node {node}: call to {kind} is ambiguous between {}", .candidates.join(" and "))]
  AmbiguousOverload {
    /// The failing node.
    node: NodeId,
    /// Operator kind.
    kind: String,
    /// Signatures of the tied candidates.
    candidates: Vec<String>,
  },
  /// A member path segment does not exist on the element type.
  #[error("node {node}: member '{segment}' of path '{path}' does not exist on {element_type}")]
  InvalidMemberPath {
    /// The failing node.
    node: NodeId,
    /// The whole path.
    path: String,
    /// The segment that failed to resolve.
    segment: String,
    /// The type the segment was resolved against.
    element_type: ElementType,
  },
  /// A sub-graph output does not satisfy the contract of its owner.
  #[error("node {node}: nested workflow output must be {expected}, found {found}")]
  InvalidSubgraphOutput {
    /// The owning node.
    node: NodeId,
    /// What the owner requires.
    expected: String,
    /// What the sub-graph produced.
    found: String,
  },
  /// A node has fewer inputs than its operator requires.
  #[error("node {node}: expected at least {expected} inputs, found {found}")]
  MissingRequiredInput {
    /// The failing node.
    node: NodeId,
    /// Minimum number of inputs.
    expected: usize,
    /// Number of connected inputs.
    found: usize,
  },
  /// The graph (or a nested graph) contains a cycle.
  #[error("workflow contains a cycle through nodes {nodes:?}")]
  IllegalCycle {
    /// Nodes lying on a cycle.
    nodes: Vec<NodeId>,
  },
  /// No descriptor is registered for a node kind.
  #[error("node {node}: unknown operator kind '{kind}'")]
  UnknownOperator {
    /// The failing node.
    node: NodeId,
    /// The unregistered kind.
    kind: String,
  },
  /// An edge is malformed.
  #[error("invalid edge {source_node} -> {target}: {reason}")]
  InvalidEdge {
    /// Source node of the edge.
    source_node: NodeId,
    /// Target node of the edge.
    target: NodeId,
    /// What is wrong with it.
    reason: String,
  },
  /// A node property is missing or malformed.
  #[error("node {node}: invalid property '{property}': {reason}")]
  InvalidProperty {
    /// The failing node.
    node: NodeId,
    /// Property name.
    property: String,
    /// What is wrong with it.
    reason: String,
  },
  /// A workflow-valued operator has no nested workflow.
  #[error("node {node}: operator {kind} requires a nested workflow")]
  MissingWorkflow {
    /// The failing node.
    node: NodeId,
    /// Operator kind.
    kind: String,
  },
  /// Two nodes share an identifier.
  #[error("duplicate node id {node}")]
  DuplicateNode {
    /// The repeated identifier.
    node: NodeId,
  },
  /// A nested workflow input point has no bound type.
  #[error("workflow input {node} is not bound to any outer input")]
  UnboundWorkflowInput {
    /// The unbound input point.
    node: NodeId,
  },
  /// The node's declared arity does not fit its operator.
  #[error("node {node}: declared arity {declared} is not within {supported}")]
  ArityMismatch {
    /// The failing node.
    node: NodeId,
    /// Arity declared on the node.
    declared: String,
    /// Arity supported by the operator.
    supported: String,
  },
  /// Sub-graphs are nested deeper than the configured limit.
  #[error("workflow nesting exceeds the maximum depth of {max_depth}")]
  NestingTooDeep {
    /// The configured limit.
    max_depth: usize,
  },
}

/// A simple string-based error, used for operator failures raised from
/// inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Error for StringError {}

/// Where and when a runtime error happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
  /// The timestamp when the error occurred.
  pub timestamp: chrono::DateTime<chrono::Utc>,
  /// The element being processed, if any.
  pub item: Option<Value>,
  /// The name of the component that raised the error.
  pub component_name: String,
  /// The type of the component that raised the error.
  pub component_type: String,
}

impl Default for ErrorContext {
  fn default() -> Self {
    Self {
      timestamp: chrono::Utc::now(),
      item: None,
      component_name: "default".to_string(),
      component_type: "default".to_string(),
    }
  }
}

/// Identifies the operator that raised a runtime error.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
  /// Node identifier or operator instance name.
  pub name: String,
  /// Operator kind.
  pub type_name: String,
}

impl Default for ComponentInfo {
  fn default() -> Self {
    Self {
      name: "default".to_string(),
      type_name: "default".to_string(),
    }
  }
}

impl ComponentInfo {
  /// Creates component info from a name and a type name.
  pub fn new(name: String, type_name: String) -> Self {
    Self { name, type_name }
  }
}

/// A runtime error carried on an element stream.
#[derive(Debug, Clone)]
pub struct StreamError {
  /// The underlying error.
  pub source: Arc<dyn Error + Send + Sync>,
  /// When and where it happened.
  pub context: ErrorContext,
  /// The operator that raised it.
  pub component: ComponentInfo,
}

impl StreamError {
  /// Creates an error with full context.
  pub fn new(
    source: Arc<dyn Error + Send + Sync>,
    context: ErrorContext,
    component: ComponentInfo,
  ) -> Self {
    Self {
      source,
      context,
      component,
    }
  }

  /// Creates an error raised by an operator instance, with a plain message.
  pub fn operator(type_name: &str, name: &str, message: impl Into<String>) -> Self {
    let component = ComponentInfo::new(name.to_string(), type_name.to_string());
    Self {
      source: Arc::new(StringError(message.into())),
      context: ErrorContext {
        component_name: component.name.clone(),
        component_type: component.type_name.clone(),
        ..ErrorContext::default()
      },
      component,
    }
  }

  /// Creates an error without operator attribution.
  pub fn message(message: impl Into<String>) -> Self {
    Self::new(
      Arc::new(StringError(message.into())),
      ErrorContext::default(),
      ComponentInfo::default(),
    )
  }

  /// Attaches the element that was being processed.
  pub fn with_item(mut self, item: Value) -> Self {
    self.context.item = Some(item);
    self
  }

  /// Returns the error message without component attribution.
  pub fn message_text(&self) -> String {
    self.source.to_string()
  }
}

/// Names the node an operator body runs for, so runtime failures carry the
/// node id and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
  kind: String,
  id: String,
}

impl Origin {
  /// An origin from a kind and a node id.
  pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      id: id.into(),
    }
  }

  /// The origin of `node`.
  pub fn of(node: &Node) -> Self {
    Self::new(node.kind.clone(), node.id.to_string())
  }

  /// The operator kind.
  pub fn kind(&self) -> &str {
    &self.kind
  }

  /// The node id.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// A runtime failure raised by the operator body.
  pub fn failure(&self, message: impl Into<String>) -> StreamError {
    StreamError::operator(&self.kind, &self.id, message)
  }

  /// A value that does not have the type resolved for its edge.
  pub fn unexpected(&self, value: &Value) -> StreamError {
    self
      .failure(format!("unexpected element {}", value))
      .with_item(value.clone())
  }
}

impl PartialEq for StreamError {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.source, &other.source) || self.source.to_string() == other.source.to_string()
  }
}

impl fmt::Display for StreamError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Error in {} ({}): {}",
      self.component.name, self.component.type_name, self.source
    )
  }
}

impl Error for StreamError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.source.as_ref())
  }
}

/// Errors raised while loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The configuration document could not be parsed.
  #[error("failed to parse configuration: {0}")]
  Parse(#[from] serde_json::Error),
  /// A setting has an unsupported value.
  #[error("invalid configuration value for '{key}': {reason}")]
  Invalid {
    /// The offending key.
    key: String,
    /// Why it was rejected.
    reason: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_operator_error_is_attributed() {
    let error = StreamError::operator("Divide", "ratio", "attempted to divide by zero").with_item(Value::Int32(4));
    assert_eq!(error.to_string(), "Error in ratio (Divide): attempted to divide by zero");
    assert_eq!(error.message_text(), "attempted to divide by zero");
    assert_eq!(error.context.component_type, "Divide");
    assert_eq!(error.context.item, Some(Value::Int32(4)));
  }

  #[test]
  fn test_compile_error_messages_name_the_node() {
    let error = CompileError::NoMatchingOverload {
      node: NodeId::from("sum"),
      kind: "Sum".to_string(),
      inputs: vec![ElementType::String],
    };
    assert_eq!(error.to_string(), "node sum: no overload of Sum accepts inputs (String)");
  }
}
