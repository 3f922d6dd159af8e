//! # Compiler Test Suite
//!
//! Structural validation, nesting, dangling branches and the compile errors
//! raised for malformed workflows.

use crate::compiler::GraphCompiler;
use crate::config::EngineConfig;
use crate::error::CompileError;
use crate::types::ElementType;
use crate::value::Value;
use crate::workflow::{ArgumentRange, Node, NodeId, Workflow};
use serde_json::json;
use std::collections::HashSet;

fn range(id: &str, count: usize) -> Node {
  Node::new(id, "Range").with_property("count", count)
}

fn compile(workflow: &Workflow) -> Result<crate::pipeline::Pipeline, CompileError> {
  GraphCompiler::new().compile(workflow)
}

/// `source -> GreaterThan(value) -> output`, with one input point.
fn greater_than(value: i32) -> Workflow {
  Workflow::new()
    .input("source")
    .node(Node::new("gt", "GreaterThan").with_property("value", value))
    .edge("source", "gt", 0)
    .output("gt")
}

fn wrap(kind: &str, nested: Workflow) -> Workflow {
  Workflow::new()
    .node(range("numbers", 5))
    .node(Node::new("op", kind).with_workflow(nested))
    .edge("numbers", "op", 0)
    .output("op")
}

#[test]
fn test_cycle_through_two_nodes_is_rejected() {
  let workflow = Workflow::new()
    .node(range("source", 3))
    .node(Node::new("zip", "Zip"))
    .node(Node::new("take", "Take").with_property("count", 1))
    .edge("source", "zip", 0)
    .edge("take", "zip", 1)
    .edge("zip", "take", 0)
    .output("zip");
  match compile(&workflow).unwrap_err() {
    CompileError::IllegalCycle { nodes } => {
      let nodes: HashSet<NodeId> = nodes.into_iter().collect();
      assert_eq!(nodes, HashSet::from([NodeId::from("zip"), NodeId::from("take")]));
    }
    other => panic!("expected a cycle, got {other}"),
  }
}

#[test]
fn test_cycle_inside_nested_workflow_is_rejected() {
  let nested = Workflow::new()
    .input("source")
    .node(Node::new("a", "Merge"))
    .node(Node::new("b", "Take").with_property("count", 1))
    .edge("source", "a", 0)
    .edge("b", "a", 1)
    .edge("a", "b", 0)
    .output("a");
  let err = compile(&wrap("NestedWorkflow", nested)).unwrap_err();
  assert!(matches!(err, CompileError::IllegalCycle { .. }));
}

#[test]
fn test_unknown_kind_is_rejected() {
  let workflow = Workflow::new().node(Node::new("mystery", "Teleport")).output("mystery");
  assert_eq!(
    compile(&workflow).unwrap_err(),
    CompileError::UnknownOperator {
      node: "mystery".into(),
      kind: "Teleport".to_string(),
    }
  );
}

#[test]
fn test_missing_input_is_rejected() {
  let workflow = Workflow::new().node(Node::new("sum", "Sum")).output("sum");
  assert_eq!(
    compile(&workflow).unwrap_err(),
    CompileError::MissingRequiredInput {
      node: "sum".into(),
      expected: 1,
      found: 0,
    }
  );
}

#[test]
fn test_extra_input_is_rejected() {
  let workflow = Workflow::new()
    .node(range("a", 1))
    .node(range("b", 1))
    .node(Node::new("sum", "Sum"))
    .edge("a", "sum", 0)
    .edge("b", "sum", 1)
    .output("sum");
  match compile(&workflow).unwrap_err() {
    CompileError::InvalidEdge { source_node, target, .. } => {
      assert_eq!(source_node, NodeId::from("b"));
      assert_eq!(target, NodeId::from("sum"));
    }
    other => panic!("expected an invalid edge, got {other}"),
  }
}

#[test]
fn test_declared_arity_outside_operator_range_is_rejected() {
  let workflow = Workflow::new()
    .node(range("a", 1))
    .node(Node::new("sum", "Sum").with_arity(ArgumentRange::between(1, 3)))
    .edge("a", "sum", 0)
    .output("sum");
  assert!(matches!(
    compile(&workflow).unwrap_err(),
    CompileError::ArityMismatch { .. }
  ));
}

#[test]
fn test_condition_needs_boolean_output() {
  let nested = Workflow::new()
    .input("source")
    .node(Node::new("take", "Take").with_property("count", 2))
    .edge("source", "take", 0)
    .output("take");
  assert_eq!(
    compile(&wrap("Condition", nested)).unwrap_err(),
    CompileError::InvalidSubgraphOutput {
      node: "op".into(),
      expected: "Bool".to_string(),
      found: "Int32".to_string(),
    }
  );
}

#[test]
fn test_condition_needs_an_output() {
  let nested = Workflow::new()
    .input("source")
    .node(Node::new("gt", "GreaterThan").with_property("value", 1))
    .edge("source", "gt", 0);
  match compile(&wrap("TakeWhile", nested)).unwrap_err() {
    CompileError::InvalidSubgraphOutput { found, .. } => assert_eq!(found, "no output"),
    other => panic!("expected an invalid output, got {other}"),
  }
}

#[test]
fn test_workflow_operator_without_nested_workflow_is_rejected() {
  let workflow = Workflow::new()
    .node(range("numbers", 1))
    .node(Node::new("op", "Publish"))
    .edge("numbers", "op", 0)
    .output("op");
  assert!(matches!(
    compile(&workflow).unwrap_err(),
    CompileError::MissingWorkflow { .. }
  ));
}

#[test]
fn test_nesting_beyond_configured_depth_is_rejected() {
  let inner = Workflow::new()
    .input("source")
    .node(Node::new("inner", "NestedWorkflow").with_workflow(greater_than(1)))
    .edge("source", "inner", 0)
    .output("inner");
  let config = EngineConfig {
    max_nesting_depth: 1,
    ..EngineConfig::default()
  };
  let err = GraphCompiler::new()
    .with_config(config)
    .compile(&wrap("NestedWorkflow", inner))
    .unwrap_err();
  assert_eq!(err, CompileError::NestingTooDeep { max_depth: 1 });
}

#[test]
fn test_referenced_top_level_input_is_unbound() {
  let workflow = Workflow::new()
    .input("source")
    .node(Node::new("take", "Take").with_property("count", 1))
    .edge("source", "take", 0)
    .output("take");
  assert_eq!(
    compile(&workflow).unwrap_err(),
    CompileError::UnboundWorkflowInput {
      node: "source".into()
    }
  );
}

#[tokio::test]
async fn test_unused_nested_input_may_stay_unbound() {
  let nested = greater_than(2).input("extra");
  let pipeline = compile(&wrap("Condition", nested)).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::Int32);
  assert_eq!(
    pipeline.collect().await.unwrap(),
    vec![Value::Int32(3), Value::Int32(4)]
  );
}

#[tokio::test]
async fn test_nested_workflow_is_inlined() {
  let pipeline = compile(&wrap("NestedWorkflow", greater_than(2))).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::Bool);
  let values = pipeline.collect().await.unwrap();
  assert_eq!(values.iter().filter(|v| **v == Value::Bool(true)).count(), 2);
}

#[tokio::test]
async fn test_failing_dangling_branch_fails_the_pipeline() {
  let workflow = Workflow::new()
    .node(range("numbers", 3))
    .node(Node::new("divide", "Divide").with_property("value", 0))
    .node(range("output", 3))
    .edge("numbers", "divide", 0)
    .output("output");
  let err = compile(&workflow).unwrap().collect().await.unwrap_err();
  assert!(err.message_text().contains("divide by zero"));
}

#[tokio::test]
async fn test_workflow_without_output_runs_every_branch() {
  let workflow = Workflow::new()
    .node(range("a", 2))
    .node(Node::new("values", "Values").with_property("values", json!(["x", "y"])));
  let pipeline = compile(&workflow).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::Unit);
  assert!(pipeline.collect().await.unwrap().is_empty());
}

#[test]
fn test_unknown_output_node_is_rejected() {
  let workflow = Workflow::new().node(range("a", 1)).output("missing");
  assert!(matches!(
    compile(&workflow).unwrap_err(),
    CompileError::InvalidSubgraphOutput { .. }
  ));
}
