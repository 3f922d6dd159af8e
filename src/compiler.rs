//! # Graph Compiler
//!
//! Turns a [`Workflow`] into a [`Pipeline`] in a single pass per graph level:
//!
//! 1. edges are validated and collected into ordered argument lists;
//! 2. nodes are sorted topologically, rejecting cycles;
//! 3. every node is resolved in order against the types of its arguments,
//!    recursing into nested workflows through [`ResolveContext::compile_nested`].
//!
//! The result of a level is a [`CompiledWorkflow`]: an ordered list of
//! resolved steps that can be applied to input sequences any number of times.
//! Applying it only composes sequences; run state is created when the
//! composed sequence is subscribed.
//!
//! A node whose output feeds more than one successor (the workflow output
//! counts as one) is shared through a [`Multicast`] hub scoped to one
//! subscription, so its upstream runs once per run whatever the fan-out.
//!
//! Terminal nodes other than the output are kept alive alongside the output.
//! Their elements are discarded, their errors are propagated, and they are
//! dropped when the output completes. A workflow without an output compiles
//! to a `Unit` sequence that runs all terminal branches to completion.

use crate::config::EngineConfig;
use crate::error::CompileError;
use crate::operator::{NestedGraph, OperatorDescriptor, ResolveContext, Stage};
use crate::multicast::{Multicast, ShareMode};
use crate::pipeline::Pipeline;
use crate::registry::OperatorRegistry;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::sequence::Sequence;
use crate::types::{ElementType, display_types};
use crate::workflow::{Node, Workflow};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone)]
enum Step {
  Input(usize),
  Stage { stage: Stage, arguments: Vec<usize> },
}

/// One level of a workflow, resolved against concrete input types.
#[derive(Clone)]
pub struct CompiledWorkflow {
  steps: Vec<(usize, Step)>,
  node_count: usize,
  output: Option<usize>,
  output_type: ElementType,
  terminals: Vec<usize>,
  multicast: Vec<bool>,
}

impl CompiledWorkflow {
  /// The element type of the output. `Unit` when there is no output node.
  pub fn output_type(&self) -> &ElementType {
    &self.output_type
  }

  /// Composes the workflow over its input sequences.
  ///
  /// Nodes feeding more than one successor are multicast: every subscription
  /// of the result composes the level again with a fresh hub per branched
  /// node, so each branch point subscribes its upstream once per run.
  pub fn apply(&self, inputs: Vec<Sequence>) -> Sequence {
    if !self.multicast.iter().any(|&shared| shared) {
      return self.compose(&inputs);
    }
    let workflow = Arc::new(self.clone());
    Sequence::new(move || workflow.compose(&inputs).subscribe())
  }

  fn compose(&self, inputs: &[Sequence]) -> Sequence {
    let mut outputs: Vec<Option<Sequence>> = vec![None; self.node_count];
    let output_of = |outputs: &[Option<Sequence>], node: usize| {
      outputs
        .get(node)
        .cloned()
        .flatten()
        .unwrap_or_else(Sequence::empty)
    };

    for (node, step) in &self.steps {
      let sequence = match step {
        Step::Input(index) => inputs.get(*index).cloned().unwrap_or_else(Sequence::empty),
        Step::Stage { stage, arguments } => {
          let arguments = arguments.iter().map(|&source| output_of(&outputs, source)).collect();
          stage.apply(arguments)
        }
      };
      let sequence = if self.multicast.get(*node).copied().unwrap_or(false) {
        Multicast::publish(sequence, ShareMode::Scoped).sequence()
      } else {
        sequence
      };
      outputs[*node] = Some(sequence);
    }

    let connections = self
      .terminals
      .iter()
      .map(|&node| output_of(&outputs, node))
      .collect();
    match self.output {
      Some(output) => Sequence::merge_output(output_of(&outputs, output), connections),
      None => Sequence::merge_connections(connections),
    }
  }
}

impl NestedGraph for CompiledWorkflow {
  fn output_type(&self) -> &ElementType {
    &self.output_type
  }

  fn has_output(&self) -> bool {
    self.output.is_some()
  }

  fn apply(&self, inputs: Vec<Sequence>) -> Sequence {
    CompiledWorkflow::apply(self, inputs)
  }
}

impl fmt::Debug for CompiledWorkflow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompiledWorkflow")
      .field("steps", &self.steps.len())
      .field("output_type", &self.output_type)
      .field("terminals", &self.terminals)
      .finish()
  }
}

/// Compiles workflows against an operator registry.
#[derive(Clone)]
pub struct GraphCompiler {
  registry: Arc<OperatorRegistry>,
  config: EngineConfig,
  scheduler: Arc<dyn Scheduler>,
}

impl Default for GraphCompiler {
  fn default() -> Self {
    Self::new()
  }
}

impl GraphCompiler {
  /// A compiler with the built-in catalog, default configuration and the
  /// tokio scheduler.
  pub fn new() -> Self {
    Self {
      registry: Arc::new(OperatorRegistry::with_builtins()),
      config: EngineConfig::default(),
      scheduler: Arc::new(TokioScheduler),
    }
  }

  /// Replaces the operator registry.
  pub fn with_registry(mut self, registry: OperatorRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  /// Replaces the configuration.
  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  /// Replaces the scheduler used by time-based operators.
  pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
    self.scheduler = scheduler;
    self
  }

  /// The operator registry.
  pub fn registry(&self) -> &OperatorRegistry {
    &self.registry
  }

  /// The configuration.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Compiles a top-level workflow into a pipeline.
  pub fn compile(&self, workflow: &Workflow) -> Result<Pipeline, CompileError> {
    let compiled = self.compile_workflow(workflow, &[], 0)?;
    let name = workflow.name.clone().unwrap_or_else(|| self.config.name.clone());
    debug!(pipeline = %name, output = %compiled.output_type, "compiled pipeline");
    Ok(Pipeline::new(
      name,
      compiled.output_type.clone(),
      compiled.apply(Vec::new()),
      self.config.clone(),
    ))
  }

  /// Compiles one level of a workflow with its input points bound to
  /// `inputs`, at nesting depth `depth`.
  pub fn compile_workflow(
    &self,
    workflow: &Workflow,
    inputs: &[ElementType],
    depth: usize,
  ) -> Result<CompiledWorkflow, CompileError> {
    let arguments = workflow.arguments()?;
    let order = workflow.topological_order(&arguments)?;
    let mut successors = vec![0usize; workflow.nodes.len()];
    for sources in &arguments {
      for &source in sources {
        successors[source] += 1;
      }
    }

    let scope = CompileScope {
      compiler: self,
      depth,
    };
    let mut types: Vec<Option<ElementType>> = vec![None; workflow.nodes.len()];
    let mut steps = Vec::with_capacity(order.len());
    for node_index in order {
      let node = &workflow.nodes[node_index];
      if node.is_input() {
        let index = workflow
          .inputs
          .iter()
          .position(|id| id == &node.id)
          .unwrap_or(usize::MAX);
        match inputs.get(index) {
          Some(ty) => {
            trace!(node = %node.id, input = index, ty = %ty, "bound workflow input");
            types[node_index] = Some(ty.clone());
            steps.push((node_index, Step::Input(index)));
          }
          None if successors[node_index] > 0 || workflow.output.as_ref() == Some(&node.id) => {
            return Err(CompileError::UnboundWorkflowInput {
              node: node.id.clone(),
            });
          }
          None => trace!(node = %node.id, "skipped unbound workflow input"),
        }
        continue;
      }

      let argument_types = arguments[node_index]
        .iter()
        .map(|&source| types[source].clone().unwrap_or(ElementType::Unit))
        .collect::<Vec<_>>();
      let stage = scope.resolve_node(node, &arguments[node_index], workflow, &argument_types)?;
      debug!(
        node = %node.id,
        kind = %node.kind,
        inputs = %display_types(&argument_types),
        output = %stage.output,
        depth,
        "resolved node"
      );
      types[node_index] = Some(stage.output.clone());
      steps.push((
        node_index,
        Step::Stage {
          stage,
          arguments: arguments[node_index].clone(),
        },
      ));
    }

    let output = match &workflow.output {
      Some(id) => Some(workflow.position(id).ok_or_else(|| CompileError::InvalidSubgraphOutput {
        node: id.clone(),
        expected: "a node of the workflow".to_string(),
        found: "an unknown node".to_string(),
      })?),
      None => None,
    };
    let output_type = match output {
      Some(output) => types[output].clone().unwrap_or(ElementType::Unit),
      None => ElementType::Unit,
    };
    let terminals = (0..workflow.nodes.len())
      .filter(|&node| successors[node] == 0 && Some(node) != output && !workflow.nodes[node].is_input())
      .collect();
    if let Some(output) = output {
      successors[output] += 1;
    }
    let multicast: Vec<bool> = successors.iter().map(|&count| count > 1).collect();
    if multicast.iter().any(|&shared| shared) {
      trace!(
        nodes = multicast.iter().filter(|&&shared| shared).count(),
        depth,
        "multicasting branched nodes"
      );
    }

    Ok(CompiledWorkflow {
      steps,
      node_count: workflow.nodes.len(),
      output,
      output_type,
      terminals,
      multicast,
    })
  }
}

/// Compiles `workflow` with a default [`GraphCompiler`].
pub fn compile(workflow: &Workflow) -> Result<Pipeline, CompileError> {
  GraphCompiler::new().compile(workflow)
}

struct CompileScope<'c> {
  compiler: &'c GraphCompiler,
  depth: usize,
}

impl CompileScope<'_> {
  fn descriptor(&self, node: &Node) -> Result<&Arc<dyn OperatorDescriptor>, CompileError> {
    self
      .compiler
      .registry
      .get(&node.kind)
      .ok_or_else(|| CompileError::UnknownOperator {
        node: node.id.clone(),
        kind: node.kind.clone(),
      })
  }

  fn resolve_node(
    &self,
    node: &Node,
    sources: &[usize],
    workflow: &Workflow,
    inputs: &[ElementType],
  ) -> Result<Stage, CompileError> {
    let descriptor = self.descriptor(node)?;
    let supported = descriptor.argument_range(node);
    if let Some(declared) = node.arity {
      if !supported.includes(&declared) {
        return Err(CompileError::ArityMismatch {
          node: node.id.clone(),
          declared: declared.to_string(),
          supported: supported.to_string(),
        });
      }
    }

    let range = node.arity.unwrap_or(supported);
    if inputs.len() < range.lower {
      return Err(CompileError::MissingRequiredInput {
        node: node.id.clone(),
        expected: range.lower,
        found: inputs.len(),
      });
    }
    if let Some(upper) = range.upper.filter(|&upper| inputs.len() > upper) {
      let extra = sources.get(upper).map(|&source| workflow.nodes[source].id.clone());
      return Err(CompileError::InvalidEdge {
        source_node: extra.unwrap_or_else(|| node.id.clone()),
        target: node.id.clone(),
        reason: format!("{} accepts at most {} arguments", node.kind, upper),
      });
    }

    descriptor.resolve(self, node, inputs)
  }
}

impl ResolveContext for CompileScope<'_> {
  fn scheduler(&self) -> Arc<dyn Scheduler> {
    self.compiler.scheduler.clone()
  }

  fn config(&self) -> &EngineConfig {
    &self.compiler.config
  }

  fn compile_nested(
    &self,
    node: &Node,
    workflow: &Workflow,
    inputs: &[ElementType],
  ) -> Result<Arc<dyn NestedGraph>, CompileError> {
    let depth = self.depth + 1;
    if depth > self.compiler.config.max_nesting_depth {
      return Err(CompileError::NestingTooDeep {
        max_depth: self.compiler.config.max_nesting_depth,
      });
    }
    trace!(node = %node.id, depth, inputs = %display_types(inputs), "compiling nested workflow");
    let compiled = self.compiler.compile_workflow(workflow, inputs, depth)?;
    Ok(Arc::new(compiled))
  }
}
