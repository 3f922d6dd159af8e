//! # Workflow Graph Model
//!
//! The abstract graph consumed by the compiler. A [`Workflow`] is an ordered
//! list of [`Node`]s and [`Edge`]s plus an ordered list of input points and
//! an optional output reference. Workflow-valued nodes (nested workflows,
//! sharing and feedback combinators) own a nested `Workflow` of the same
//! shape.
//!
//! ## Graph invariants
//!
//! - Node ids are unique within one graph level.
//! - Every edge leaves output slot 0 of an existing node and enters an existing
//!   node at an argument index.
//! - The argument indices entering a node are unique and contiguous from 0.
//! - Every graph level is acyclic. Feedback is expressed by ownership: a
//!   feedback node owns the sub-graph that consumes its main stream.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_workflow::workflow::{Node, Workflow};
//!
//! let workflow = Workflow::new()
//!   .node(Node::new("source", "Range").with_property("count", 3))
//!   .node(Node::new("take", "Take").with_property("count", 2))
//!   .edge("source", "take", 0)
//!   .output("take");
//! assert_eq!(workflow.nodes.len(), 2);
//! ```

use crate::error::CompileError;
use crate::properties::PropertyBag;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Operator kind of the pass-through input points of a workflow.
pub const WORKFLOW_INPUT: &str = "WorkflowInput";

/// Identifies a node within one graph level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
  /// Creates an id.
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// Returns the id as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for NodeId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for NodeId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// An inclusive range of accepted input counts. `upper == None` means any
/// number of inputs from `lower` up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentRange {
  /// Minimum number of inputs.
  pub lower: usize,
  /// Maximum number of inputs, if bounded.
  pub upper: Option<usize>,
}

impl ArgumentRange {
  /// A range accepting exactly `count` inputs.
  pub const fn exactly(count: usize) -> Self {
    Self {
      lower: count,
      upper: Some(count),
    }
  }

  /// A range accepting `lower..=upper` inputs.
  pub const fn between(lower: usize, upper: usize) -> Self {
    Self {
      lower,
      upper: Some(upper),
    }
  }

  /// A range accepting at least `lower` inputs.
  pub const fn at_least(lower: usize) -> Self {
    Self { lower, upper: None }
  }

  /// Returns true if `count` inputs are accepted.
  pub fn contains(&self, count: usize) -> bool {
    count >= self.lower && self.upper.is_none_or(|upper| count <= upper)
  }

  /// Returns true if every count accepted by `other` is accepted by `self`.
  pub fn includes(&self, other: &ArgumentRange) -> bool {
    other.lower >= self.lower
      && match (self.upper, other.upper) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(mine), Some(theirs)) => theirs <= mine,
      }
  }
}

impl fmt::Display for ArgumentRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.upper {
      Some(upper) => write!(f, "[{}, {}]", self.lower, upper),
      None => write!(f, "[{}, unbounded]", self.lower),
    }
  }
}

/// A node of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  /// Identity within the owning graph.
  pub id: NodeId,
  /// Operator kind, looked up in the operator registry.
  pub kind: String,
  /// Operator specific configuration.
  #[serde(default)]
  pub properties: PropertyBag,
  /// Declared input arity. Narrows the operator's own range when set.
  #[serde(default)]
  pub arity: Option<ArgumentRange>,
  /// Nested workflow, for workflow-valued operators.
  #[serde(default)]
  pub workflow: Option<Box<Workflow>>,
}

impl Node {
  /// Creates a node with no properties.
  pub fn new(id: impl Into<NodeId>, kind: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind: kind.into(),
      properties: PropertyBag::new(),
      arity: None,
      workflow: None,
    }
  }

  /// Creates a workflow input point.
  pub fn input(id: impl Into<NodeId>) -> Self {
    Self::new(id, WORKFLOW_INPUT)
  }

  /// Sets a property.
  pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
    self.properties.insert(key, value);
    self
  }

  /// Declares the accepted input arity.
  pub fn with_arity(mut self, arity: ArgumentRange) -> Self {
    self.arity = Some(arity);
    self
  }

  /// Attaches a nested workflow.
  pub fn with_workflow(mut self, workflow: Workflow) -> Self {
    self.workflow = Some(Box::new(workflow));
    self
  }

  /// Returns true for workflow input points.
  pub fn is_input(&self) -> bool {
    self.kind == WORKFLOW_INPUT
  }
}

/// A directed connection from the output of one node to an argument of
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  /// Producing node.
  pub source: NodeId,
  /// Output slot of the producing node. Nodes have one output, slot 0.
  #[serde(default)]
  pub output_slot: usize,
  /// Consuming node.
  pub target: NodeId,
  /// Argument position on the consuming node.
  pub argument_index: usize,
}

/// A workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  /// Optional display name.
  #[serde(default)]
  pub name: Option<String>,
  /// Nodes in declaration order.
  #[serde(default)]
  pub nodes: Vec<Node>,
  /// Edges in declaration order.
  #[serde(default)]
  pub edges: Vec<Edge>,
  /// Ordered pass-through input points.
  #[serde(default)]
  pub inputs: Vec<NodeId>,
  /// The node whose output is the workflow output.
  #[serde(default)]
  pub output: Option<NodeId>,
}

/// The validated incoming arguments of every node, indexed like
/// `Workflow::nodes`.
pub(crate) type Arguments = Vec<Vec<usize>>;

impl Workflow {
  /// Creates an empty workflow.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the display name.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Adds a node.
  pub fn node(mut self, node: Node) -> Self {
    self.nodes.push(node);
    self
  }

  /// Adds an input point, appended to the ordered input list.
  pub fn input(mut self, id: impl Into<NodeId>) -> Self {
    let id = id.into();
    self.inputs.push(id.clone());
    self.nodes.push(Node::input(id));
    self
  }

  /// Connects `source` to argument `argument_index` of `target`.
  pub fn edge(
    mut self,
    source: impl Into<NodeId>,
    target: impl Into<NodeId>,
    argument_index: usize,
  ) -> Self {
    self.edges.push(Edge {
      source: source.into(),
      output_slot: 0,
      target: target.into(),
      argument_index,
    });
    self
  }

  /// Designates the output node.
  pub fn output(mut self, id: impl Into<NodeId>) -> Self {
    self.output = Some(id.into());
    self
  }

  /// Returns the position of a node in declaration order.
  pub fn position(&self, id: &NodeId) -> Option<usize> {
    self.nodes.iter().position(|node| &node.id == id)
  }

  /// Checks node identity, input points and edges, and returns the argument
  /// sources of every node ordered by argument index.
  pub(crate) fn arguments(&self) -> Result<Arguments, CompileError> {
    let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(self.nodes.len());
    for (position, node) in self.nodes.iter().enumerate() {
      if index.insert(&node.id, position).is_some() {
        return Err(CompileError::DuplicateNode {
          node: node.id.clone(),
        });
      }
    }

    let listed: HashSet<&NodeId> = self.inputs.iter().collect();
    for id in &self.inputs {
      match index.get(id) {
        Some(&position) if self.nodes[position].is_input() => {}
        _ => return Err(CompileError::UnboundWorkflowInput { node: id.clone() }),
      }
    }
    if let Some(node) = self.nodes.iter().find(|n| n.is_input() && !listed.contains(&n.id)) {
      return Err(CompileError::UnboundWorkflowInput {
        node: node.id.clone(),
      });
    }

    let mut slots: Vec<Vec<Option<usize>>> = vec![Vec::new(); self.nodes.len()];
    for edge in &self.edges {
      let invalid = |reason: &str| CompileError::InvalidEdge {
        source_node: edge.source.clone(),
        target: edge.target.clone(),
        reason: reason.to_string(),
      };
      let source = *index.get(&edge.source).ok_or_else(|| invalid("unknown source node"))?;
      let target = *index.get(&edge.target).ok_or_else(|| invalid("unknown target node"))?;
      if edge.output_slot != 0 {
        return Err(invalid("nodes have a single output slot"));
      }
      if self.nodes[target].is_input() {
        return Err(invalid("workflow inputs cannot be edge targets"));
      }

      let arguments = &mut slots[target];
      if arguments.len() <= edge.argument_index {
        arguments.resize(edge.argument_index + 1, None);
      }
      if arguments[edge.argument_index].replace(source).is_some() {
        return Err(invalid("argument index is already connected"));
      }
    }

    slots
      .into_iter()
      .enumerate()
      .map(|(position, arguments)| {
        arguments
          .into_iter()
          .enumerate()
          .map(|(argument, source)| {
            source.ok_or_else(|| CompileError::InvalidEdge {
              source_node: NodeId::new("?"),
              target: self.nodes[position].id.clone(),
              reason: format!("argument {} is not connected", argument),
            })
          })
          .collect()
      })
      .collect()
  }

  /// Orders nodes so that every node comes after all of its arguments.
  ///
  /// Ties keep declaration order. Fails with `IllegalCycle` naming the nodes
  /// that lie on cycles.
  pub(crate) fn topological_order(&self, arguments: &Arguments) -> Result<Vec<usize>, CompileError> {
    let count = self.nodes.len();
    let mut in_degree = vec![0usize; count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (target, sources) in arguments.iter().enumerate() {
      for &source in sources {
        successors[source].push(target);
        in_degree[target] += 1;
      }
    }

    let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    let mut remaining = in_degree.clone();
    while let Some(node) = queue.pop_front() {
      order.push(node);
      let mut ready = Vec::new();
      for &next in &successors[node] {
        remaining[next] -= 1;
        if remaining[next] == 0 {
          ready.push(next);
        }
      }
      ready.sort_unstable();
      queue.extend(ready);
    }

    if order.len() == count {
      return Ok(order);
    }

    // Peel nodes that only lead out of the cyclic remainder.
    let mut cyclic: HashSet<usize> = (0..count).filter(|&i| remaining[i] > 0).collect();
    loop {
      let leaves: Vec<usize> = cyclic
        .iter()
        .copied()
        .filter(|&node| !successors[node].iter().any(|next| cyclic.contains(next)))
        .collect();
      if leaves.is_empty() {
        break;
      }
      for leaf in leaves {
        cyclic.remove(&leaf);
      }
    }

    let mut nodes: Vec<usize> = cyclic.into_iter().collect();
    nodes.sort_unstable();
    Err(CompileError::IllegalCycle {
      nodes: nodes.into_iter().map(|i| self.nodes[i].id.clone()).collect(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chain() -> Workflow {
    Workflow::new()
      .node(Node::new("a", "Range"))
      .node(Node::new("b", "Take"))
      .node(Node::new("c", "Skip"))
      .edge("b", "c", 0)
      .edge("a", "b", 0)
      .output("c")
  }

  #[test]
  fn test_topological_order_follows_edges() {
    let workflow = chain();
    let arguments = workflow.arguments().unwrap();
    assert_eq!(workflow.topological_order(&arguments).unwrap(), vec![0, 1, 2]);
  }

  #[test]
  fn test_cycle_reports_cycle_members_only() {
    let workflow = Workflow::new()
      .node(Node::new("source", "Range"))
      .node(Node::new("x", "Zip"))
      .node(Node::new("y", "Take"))
      .node(Node::new("tail", "Skip"))
      .edge("source", "x", 0)
      .edge("y", "x", 1)
      .edge("x", "y", 0)
      .edge("y", "tail", 0);
    let arguments = workflow.arguments().unwrap();
    let err = workflow.topological_order(&arguments).unwrap_err();
    assert_eq!(
      err,
      CompileError::IllegalCycle {
        nodes: vec![NodeId::from("x"), NodeId::from("y")],
      }
    );
  }

  #[test]
  fn test_argument_gaps_are_rejected() {
    let workflow = Workflow::new()
      .node(Node::new("a", "Range"))
      .node(Node::new("zip", "Zip"))
      .edge("a", "zip", 1);
    assert!(matches!(
      workflow.arguments(),
      Err(CompileError::InvalidEdge { .. })
    ));
  }

  #[test]
  fn test_duplicate_argument_index_is_rejected() {
    let workflow = Workflow::new()
      .node(Node::new("a", "Range"))
      .node(Node::new("b", "Range"))
      .node(Node::new("zip", "Zip"))
      .edge("a", "zip", 0)
      .edge("b", "zip", 0);
    assert!(matches!(
      workflow.arguments(),
      Err(CompileError::InvalidEdge { .. })
    ));
  }

  #[test]
  fn test_duplicate_node_ids_are_rejected() {
    let workflow = Workflow::new()
      .node(Node::new("a", "Range"))
      .node(Node::new("a", "Take"));
    assert_eq!(
      workflow.arguments().unwrap_err(),
      CompileError::DuplicateNode {
        node: NodeId::from("a")
      }
    );
  }

  #[test]
  fn test_unlisted_input_point_is_rejected() {
    let workflow = Workflow::new().node(Node::input("stray"));
    assert!(matches!(
      workflow.arguments(),
      Err(CompileError::UnboundWorkflowInput { .. })
    ));
  }

  #[test]
  fn test_argument_range_inclusion() {
    let scan = ArgumentRange::between(1, 2);
    assert!(scan.contains(1) && scan.contains(2) && !scan.contains(3));
    assert!(ArgumentRange::at_least(1).includes(&scan));
    assert!(!scan.includes(&ArgumentRange::at_least(1)));
    assert_eq!(ArgumentRange::at_least(2).to_string(), "[2, unbounded]");
  }

  #[test]
  fn test_workflow_serde_round_trip_keeps_nesting() {
    let workflow = Workflow::new()
      .input("source")
      .node(Node::new("cond", "Condition").with_workflow(chain()))
      .edge("source", "cond", 0)
      .output("cond");
    let json = serde_json::to_string(&workflow).unwrap();
    let back: Workflow = serde_json::from_str(&json).unwrap();
    assert_eq!(back, workflow);
  }
}
