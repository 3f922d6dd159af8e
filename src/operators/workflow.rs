//! # Workflow-Valued Operators
//!
//! Nodes of these kinds own a nested workflow. The descriptor compiles the
//! nested workflow against the types flowing into the node and splices it
//! into a combinator:
//!
//! | Kind | Nested inputs | Nested output | Combinator |
//! |---|---|---|---|
//! | `NestedWorkflow` | node inputs | any | inlined as is |
//! | `Publish` | shared first input, rest | any | [`publish_with`] |
//! | `Replay` | replayed first input, rest | any | [`replay_with`] |
//! | `Condition`, `TakeWhile`, `SkipWhile` | shared first input, rest | `Bool` | [`condition`] |
//! | `Scan` | `ElementAccumulation<Seed, Source>` | `Seed` | [`scan`], [`scan_seeded`] |
//! | `RepeatWhile` | `Unit` completion signals | `Bool` | [`repeat_while`] |
//! | `Sink`, `Visualizer` | shared first input, rest | optional | [`side_effect`] |

use super::{Origin, invalid_property, optional};
use crate::error::CompileError;
use crate::feedback::{ConditionAction, condition, repeat_while, scan, scan_seeded};
use crate::multicast::{ReplayPolicy, publish_with, replay_with};
use crate::operator::{NestedGraph, OperatorDescriptor, ResolveContext, Stage};
use crate::registry::OperatorRegistry;
use crate::sequence::{Selector, Sequence};
use crate::side_effect::side_effect;
use crate::types::ElementType;
use crate::workflow::{ArgumentRange, Node, Workflow};
use std::sync::Arc;
use tracing::debug;

/// What a workflow-valued node does with its nested workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  /// Inline the nested workflow.
  Nested,
  /// Run it over a hot shared view of the first input.
  Publish,
  /// Run it over a replaying view of the first input.
  Replay,
  /// Use it as a predicate sampled per element.
  Condition(ConditionAction),
  /// Use it as an accumulator.
  Scan,
  /// Use it as a repetition predicate.
  RepeatWhile,
  /// Run it for effect alongside the first input.
  SideEffect,
}

/// A descriptor for one workflow-valued operator kind.
#[derive(Debug, Clone)]
pub struct WorkflowOperator {
  kind: String,
  role: Role,
}

impl WorkflowOperator {
  /// Creates the descriptor of `kind`.
  pub fn new(kind: impl Into<String>, role: Role) -> Self {
    Self {
      kind: kind.into(),
      role,
    }
  }

  fn require_output(&self, node: &Node, nested: &dyn NestedGraph, expected: Option<&ElementType>) -> Result<(), CompileError> {
    let found = if nested.has_output() {
      nested.output_type().to_string()
    } else {
      "no output".to_string()
    };
    let satisfied = nested.has_output() && expected.is_none_or(|expected| nested.output_type() == expected);
    if satisfied {
      return Ok(());
    }
    Err(CompileError::InvalidSubgraphOutput {
      node: node.id.clone(),
      expected: expected.map_or_else(|| "an output".to_string(), ToString::to_string),
      found,
    })
  }
}

fn workflow<'n>(node: &'n Node, kind: &str) -> Result<&'n Workflow, CompileError> {
  node.workflow.as_deref().ok_or_else(|| CompileError::MissingWorkflow {
    node: node.id.clone(),
    kind: kind.to_string(),
  })
}

/// A selector that runs `nested` with the shared sequence as first input and
/// `rest` after it.
fn selector(nested: Arc<dyn NestedGraph>, rest: Vec<Sequence>) -> Selector {
  Arc::new(move |shared: Sequence| {
    let mut inputs = Vec::with_capacity(rest.len() + 1);
    inputs.push(shared);
    inputs.extend(rest.iter().cloned());
    nested.apply(inputs)
  })
}

fn split(inputs: Vec<Sequence>) -> (Sequence, Vec<Sequence>) {
  let mut inputs = inputs.into_iter();
  let source = inputs.next().unwrap_or_else(Sequence::empty);
  (source, inputs.collect())
}

impl OperatorDescriptor for WorkflowOperator {
  fn kind(&self) -> &str {
    &self.kind
  }

  fn argument_range(&self, node: &Node) -> ArgumentRange {
    let declared = node.workflow.as_ref().map_or(0, |workflow| workflow.inputs.len());
    match self.role {
      Role::Nested => ArgumentRange::exactly(declared),
      Role::Scan => ArgumentRange::between(1, 2),
      Role::RepeatWhile => ArgumentRange::exactly(1),
      Role::Publish | Role::Replay | Role::Condition(_) | Role::SideEffect => {
        ArgumentRange::between(1, declared.max(1))
      }
    }
  }

  fn resolve(
    &self,
    ctx: &dyn ResolveContext,
    node: &Node,
    inputs: &[ElementType],
  ) -> Result<Stage, CompileError> {
    let workflow = workflow(node, &self.kind)?;
    let source_type = inputs.first().cloned().unwrap_or(ElementType::Unit);

    let stage = match self.role {
      Role::Nested => {
        let nested = ctx.compile_nested(node, workflow, inputs)?;
        self.require_output(node, nested.as_ref(), None)?;
        Stage::new(nested.output_type().clone(), move |inputs: Vec<Sequence>| nested.apply(inputs))
      }
      Role::Publish => {
        let nested = ctx.compile_nested(node, workflow, inputs)?;
        self.require_output(node, nested.as_ref(), None)?;
        Stage::new(nested.output_type().clone(), move |inputs: Vec<Sequence>| {
          let (source, rest) = split(inputs);
          publish_with(source, selector(nested.clone(), rest))
        })
      }
      Role::Replay => {
        let policy = ReplayPolicy {
          buffer_size: optional(node, |p| p.get_usize("buffer_size"))?,
          window: optional(node, |p| p.get_duration("window"))?,
        };
        if policy.buffer_size == Some(0) {
          return Err(invalid_property(node, "buffer_size", "buffer size must be positive"));
        }
        let nested = ctx.compile_nested(node, workflow, inputs)?;
        self.require_output(node, nested.as_ref(), None)?;
        let scheduler = ctx.scheduler();
        Stage::new(nested.output_type().clone(), move |inputs: Vec<Sequence>| {
          let (source, rest) = split(inputs);
          replay_with(source, policy, scheduler.clone(), selector(nested.clone(), rest))
        })
      }
      Role::Condition(action) => {
        let nested = ctx.compile_nested(node, workflow, inputs)?;
        self.require_output(node, nested.as_ref(), Some(&ElementType::Bool))?;
        let origin = Origin::of(node);
        Stage::new(source_type, move |inputs: Vec<Sequence>| {
          let (source, rest) = split(inputs);
          condition(source, selector(nested.clone(), rest), action, origin.clone())
        })
      }
      Role::Scan => {
        let seed_type = inputs.get(1).cloned().unwrap_or_else(|| source_type.clone());
        let snapshot = ElementType::accumulation(seed_type.clone(), source_type);
        let nested = ctx.compile_nested(node, workflow, &[snapshot])?;
        self.require_output(node, nested.as_ref(), Some(&seed_type))?;
        Stage::new(seed_type, move |inputs: Vec<Sequence>| {
          let (source, rest) = split(inputs);
          let accumulator = selector(nested.clone(), Vec::new());
          match rest.into_iter().next() {
            Some(seed) => scan_seeded(source, seed, accumulator),
            None => scan(source, accumulator),
          }
        })
      }
      Role::RepeatWhile => {
        let nested = ctx.compile_nested(node, workflow, &[ElementType::Unit])?;
        self.require_output(node, nested.as_ref(), Some(&ElementType::Bool))?;
        let origin = Origin::of(node);
        Stage::new(source_type, move |inputs: Vec<Sequence>| {
          let (source, _) = split(inputs);
          repeat_while(source, selector(nested.clone(), Vec::new()), origin.clone())
        })
      }
      Role::SideEffect => {
        let nested = ctx.compile_nested(node, workflow, inputs)?;
        Stage::new(source_type, move |inputs: Vec<Sequence>| {
          let (source, rest) = split(inputs);
          side_effect(source, selector(nested.clone(), rest))
        })
      }
    };

    debug!(node = %node.id, kind = %self.kind, output = %stage.output, "spliced nested workflow");
    Ok(stage)
  }
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  for (kind, role) in [
    ("NestedWorkflow", Role::Nested),
    ("Publish", Role::Publish),
    ("Replay", Role::Replay),
    ("Condition", Role::Condition(ConditionAction::Where)),
    ("TakeWhile", Role::Condition(ConditionAction::TakeWhile)),
    ("SkipWhile", Role::Condition(ConditionAction::SkipWhile)),
    ("Scan", Role::Scan),
    ("RepeatWhile", Role::RepeatWhile),
    ("Sink", Role::SideEffect),
    ("Visualizer", Role::SideEffect),
  ] {
    registry.register(WorkflowOperator::new(kind, role));
  }
}
