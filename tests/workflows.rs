use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use streamweave_workflow::operator::Stage;
use streamweave_workflow::resolver::{Overload, OverloadSet, TypePattern};
use streamweave_workflow::{
  CompileError, ElementType, GraphCompiler, Node, OperatorRegistry, Sequence, StreamError, Value,
  Workflow, compile,
};

fn init_tracing() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ints(values: &[i32]) -> Vec<Value> {
  values.iter().copied().map(Value::Int32).collect()
}

fn range(id: &str, start: i32, count: usize) -> Node {
  Node::new(id, "Range")
    .with_property("start", start)
    .with_property("count", count)
}

/// A registry with a `Counted` source that records every element it
/// produces, and an `Explode` operator failing on `Int32(1)`.
fn instrumented(produced: Arc<AtomicUsize>) -> OperatorRegistry {
  let mut registry = OperatorRegistry::with_builtins();
  registry.register(OverloadSet::new(
    "Counted",
    vec![Overload::new(vec![], move |_| {
      let produced = produced.clone();
      Ok(Stage::new(ElementType::Int32, move |_: Vec<Sequence>| {
        let produced = produced.clone();
        Sequence::from_values(ints(&[1, 2, 3, 4])).inspect(move |_| {
          produced.fetch_add(1, Ordering::SeqCst);
        })
      }))
    })],
  ));
  registry.register(OverloadSet::new(
    "Explode",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      Ok(Stage::new(b.slot(0).clone(), |inputs: Vec<Sequence>| {
        let source = inputs.into_iter().next().unwrap_or_else(Sequence::empty);
        source.map(|value| match value {
          Value::Int32(1) => Err(StreamError::message("exploded on 1")),
          other => Ok(other),
        })
      }))
    })],
  ));
  registry
}

/// `source` fed twice into a `Zip`.
fn self_zip() -> Workflow {
  Workflow::new()
    .input("source")
    .node(Node::new("zip", "Zip"))
    .edge("source", "zip", 0)
    .edge("source", "zip", 1)
    .output("zip")
}

fn around(kind: &str, source: Node, nested: Workflow) -> Workflow {
  let source_id = source.id.clone();
  Workflow::new()
    .node(source)
    .node(Node::new("op", kind).with_workflow(nested))
    .edge(source_id, "op", 0)
    .output("op")
}

#[tokio::test]
async fn test_scan_accumulates_running_sum() {
  init_tracing();
  let accumulator = Workflow::new()
    .input("snapshot")
    .node(Node::new("add", "Add"))
    .edge("snapshot", "add", 0)
    .output("add");
  let pipeline = compile(&around("Scan", range("numbers", 1, 3), accumulator)).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::Int32);
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[1, 3, 6]));
}

#[tokio::test]
async fn test_scan_with_seed_input() {
  let accumulator = Workflow::new()
    .input("snapshot")
    .node(Node::new("add", "Add"))
    .edge("snapshot", "add", 0)
    .output("add");
  let workflow = around("Scan", range("numbers", 1, 3), accumulator)
    .node(Node::new("seed", "Values").with_property("values", json!([100])))
    .edge("seed", "op", 1);
  let pipeline = compile(&workflow).unwrap();
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[101, 103, 106]));
}

#[tokio::test]
async fn test_publish_subscribes_source_once() {
  init_tracing();
  let produced = Arc::new(AtomicUsize::new(0));
  let compiler = GraphCompiler::new().with_registry(instrumented(produced.clone()));

  let pipeline = compiler
    .compile(&around("Publish", Node::new("counted", "Counted"), self_zip()))
    .unwrap();
  let values = pipeline.collect().await.unwrap();

  assert_eq!(values.len(), 4);
  assert_eq!(produced.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_branched_input_of_inlined_workflow_is_shared() {
  let produced = Arc::new(AtomicUsize::new(0));
  let compiler = GraphCompiler::new().with_registry(instrumented(produced.clone()));

  let pipeline = compiler
    .compile(&around("NestedWorkflow", Node::new("counted", "Counted"), self_zip()))
    .unwrap();
  assert_eq!(pipeline.collect().await.unwrap().len(), 4);
  assert_eq!(produced.load(Ordering::SeqCst), 4);

  pipeline.collect().await.unwrap();
  assert_eq!(produced.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_branched_node_runs_once_per_run() {
  let produced = Arc::new(AtomicUsize::new(0));
  let compiler = GraphCompiler::new().with_registry(instrumented(produced.clone()));
  let workflow = Workflow::new()
    .node(Node::new("counted", "Counted"))
    .node(Node::new("merge", "Merge"))
    .node(Node::new("total", "Sum"))
    .edge("counted", "merge", 0)
    .edge("counted", "merge", 1)
    .edge("counted", "total", 0)
    .output("merge");

  let values = compiler.compile(&workflow).unwrap().collect().await.unwrap();
  assert_eq!(values.len(), 8);
  assert_eq!(produced.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_sequential_reuse_of_branched_node_sees_completion() {
  let workflow = Workflow::new()
    .node(range("numbers", 0, 3))
    .node(Node::new("concat", "Concat"))
    .edge("numbers", "concat", 0)
    .edge("numbers", "concat", 1)
    .output("concat");
  let pipeline = compile(&workflow).unwrap();
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[0, 1, 2]));
}

#[tokio::test]
async fn test_replay_serves_last_elements_to_late_consumer() {
  let once_more = Workflow::new()
    .input("signal")
    .node(Node::new("index", "ElementIndex"))
    .node(Node::new("select", "MemberSelector").with_property("selector", "Index"))
    .node(Node::new("again", "LessThan").with_property("value", 1))
    .edge("signal", "index", 0)
    .edge("index", "select", 0)
    .edge("select", "again", 0)
    .output("again");
  let nested = Workflow::new()
    .input("source")
    .node(Node::new("repeat", "RepeatWhile").with_workflow(once_more))
    .edge("source", "repeat", 0)
    .output("repeat");
  let workflow = Workflow::new()
    .node(range("numbers", 0, 4))
    .node(
      Node::new("op", "Replay")
        .with_property("buffer_size", 2)
        .with_workflow(nested),
    )
    .edge("numbers", "op", 0)
    .output("op");
  let pipeline = compile(&workflow).unwrap();
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[0, 1, 2, 3, 2, 3]));
}

#[tokio::test]
async fn test_sink_passes_source_through() {
  let effect = Workflow::new()
    .input("source")
    .node(Node::new("positive", "GreaterThan").with_property("value", 0))
    .edge("source", "positive", 0);
  let pipeline = compile(&around("Sink", range("numbers", 0, 3), effect)).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::Int32);
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[0, 1, 2]));
}

#[tokio::test]
async fn test_sink_error_ends_output_after_failing_element() {
  let effect = Workflow::new()
    .input("source")
    .node(Node::new("explode", "Explode"))
    .edge("source", "explode", 0);
  let compiler = GraphCompiler::new().with_registry(instrumented(Arc::new(AtomicUsize::new(0))));
  let pipeline = compiler
    .compile(&around("Visualizer", range("numbers", 0, 3), effect))
    .unwrap();

  let mut stream = pipeline.subscribe();
  let mut values = Vec::new();
  let mut errors = Vec::new();
  while let Some(item) = futures::StreamExt::next(&mut stream).await {
    match item {
      Ok(value) => values.push(value),
      Err(error) => errors.push(error.message_text()),
    }
  }
  assert_eq!(values, ints(&[0, 1]));
  assert_eq!(errors, vec!["exploded on 1".to_string()]);
}

#[tokio::test]
async fn test_repeat_while_counts_completed_passes() {
  init_tracing();
  let predicate = Workflow::new()
    .input("signal")
    .node(Node::new("index", "ElementIndex"))
    .node(Node::new("select", "MemberSelector").with_property("selector", "Index"))
    .node(Node::new("again", "LessThan").with_property("value", 2))
    .edge("signal", "index", 0)
    .edge("index", "select", 0)
    .edge("select", "again", 0)
    .output("again");
  let source = Node::new("pair", "Values").with_property("values", json!([1, 2]));
  let pipeline = compile(&around("RepeatWhile", source, predicate)).unwrap();
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[1, 2, 1, 2, 1, 2]));
}

#[tokio::test]
async fn test_take_while_on_shared_source() {
  let predicate = Workflow::new()
    .input("source")
    .node(Node::new("small", "LessThan").with_property("value", 3))
    .edge("source", "small", 0)
    .output("small");
  let pipeline = compile(&around("TakeWhile", range("numbers", 0, 10), predicate)).unwrap();
  assert_eq!(pipeline.collect().await.unwrap(), ints(&[0, 1, 2]));
}

#[tokio::test]
async fn test_condition_with_member_path_on_tuples() {
  let predicate = Workflow::new()
    .input("pair")
    .node(Node::new("second", "MemberSelector").with_property("selector", "Item2"))
    .node(Node::new("flag", "Equal").with_property("value", true))
    .edge("pair", "second", 0)
    .edge("second", "flag", 0)
    .output("flag");
  let source = Node::new("pairs", "Values").with_property("values", json!([[1, true], [2, false], [3, true]]));
  let pipeline = compile(&around("Condition", source, predicate)).unwrap();
  let firsts: Vec<Value> = pipeline
    .collect()
    .await
    .unwrap()
    .into_iter()
    .filter_map(|pair| match pair {
      Value::Tuple(items) => items.into_iter().next(),
      _ => None,
    })
    .collect();
  assert_eq!(firsts, ints(&[1, 3]));
}

#[tokio::test]
async fn test_buffer_trigger_from_workflow() {
  let workflow = Workflow::new()
    .node(range("numbers", 0, 5))
    .node(Node::new("trigger", "Range").with_property("count", 1))
    .node(Node::new("buffer", "TriggeredBuffer").with_property("count", 3))
    .edge("numbers", "buffer", 0)
    .edge("trigger", "buffer", 1)
    .output("buffer");
  let pipeline = compile(&workflow).unwrap();
  assert_eq!(pipeline.output_type(), &ElementType::list(ElementType::Int32));
  assert_eq!(pipeline.collect().await.unwrap(), vec![Value::List(ints(&[0, 1, 2]))]);
}

#[test]
fn test_cycle_is_reported_before_resolution() {
  let workflow = Workflow::new()
    .node(Node::new("a", "Take").with_property("count", 1))
    .node(Node::new("b", "Skip").with_property("count", 1))
    .edge("a", "b", 0)
    .edge("b", "a", 0)
    .output("b");
  assert!(matches!(compile(&workflow), Err(CompileError::IllegalCycle { .. })));
}
