//! # Operator Descriptors
//!
//! An [`OperatorDescriptor`] is the compile-time face of an operator kind: it
//! reports how many inputs a node of that kind accepts and turns a node plus
//! its concrete input types into a [`Stage`]. A stage pairs the resolved
//! output type with the [`Operator`] that composes the input sequences at
//! run time.
//!
//! Descriptors never hold per-execution state. Everything an execution needs
//! is allocated when the composed sequence is subscribed.

use crate::config::EngineConfig;
use crate::error::CompileError;
use crate::scheduler::Scheduler;
use crate::sequence::Sequence;
use crate::types::ElementType;
use crate::workflow::{ArgumentRange, Node, Workflow};
use std::fmt;
use std::sync::Arc;

/// The run-time entry point of a resolved node.
pub trait Operator: Send + Sync {
  /// Composes the input sequences into the node's output sequence.
  fn apply(&self, inputs: Vec<Sequence>) -> Sequence;
}

impl<F> Operator for F
where
  F: Fn(Vec<Sequence>) -> Sequence + Send + Sync,
{
  fn apply(&self, inputs: Vec<Sequence>) -> Sequence {
    self(inputs)
  }
}

/// A resolved node: its output type and the operator implementing it.
#[derive(Clone)]
pub struct Stage {
  /// Element type of the node's output.
  pub output: ElementType,
  /// The operator composing the node's inputs.
  pub operator: Arc<dyn Operator>,
}

impl Stage {
  /// Creates a stage from any operator.
  pub fn new(output: ElementType, operator: impl Operator + 'static) -> Self {
    Self {
      output,
      operator: Arc::new(operator),
    }
  }

  /// Applies the stage to its inputs.
  pub fn apply(&self, inputs: Vec<Sequence>) -> Sequence {
    self.operator.apply(inputs)
  }
}

impl fmt::Debug for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stage").field("output", &self.output).finish_non_exhaustive()
  }
}

/// A sub-graph compiled against concrete input types.
///
/// Produced by [`ResolveContext::compile_nested`]; workflow-valued operators
/// splice it into their own stage through [`NestedGraph::apply`].
pub trait NestedGraph: Send + Sync {
  /// The sub-graph's output type. `Unit` when it has no output.
  fn output_type(&self) -> &ElementType;

  /// Returns true when the sub-graph declares an output node.
  fn has_output(&self) -> bool;

  /// Composes the sub-graph over its input sequences.
  fn apply(&self, inputs: Vec<Sequence>) -> Sequence;
}

/// Services available to descriptors while resolving a node.
pub trait ResolveContext {
  /// The scheduler that time-based operators run on.
  fn scheduler(&self) -> Arc<dyn Scheduler>;

  /// The engine configuration.
  fn config(&self) -> &EngineConfig;

  /// Compiles `workflow` with its input points bound to `inputs`, one level
  /// below the current node.
  fn compile_nested(
    &self,
    node: &Node,
    workflow: &Workflow,
    inputs: &[ElementType],
  ) -> Result<Arc<dyn NestedGraph>, CompileError>;
}

/// Describes one operator kind to the compiler.
pub trait OperatorDescriptor: Send + Sync {
  /// The kind identifier nodes refer to.
  fn kind(&self) -> &str;

  /// How many inputs a node of this kind accepts.
  fn argument_range(&self, node: &Node) -> ArgumentRange;

  /// Resolves `node` against concrete input types.
  fn resolve(
    &self,
    ctx: &dyn ResolveContext,
    node: &Node,
    inputs: &[ElementType],
  ) -> Result<Stage, CompileError>;
}
