use std::time::Duration;
use streamweave_workflow::{
  EngineConfig, ExecutionOutcome, ExecutionState, GraphCompiler, Node, Notification, Value, Workflow,
};
use tokio::sync::mpsc;

fn counting(count: usize) -> Workflow {
  Workflow::new()
    .named("counting")
    .node(Node::new("numbers", "Range").with_property("count", count))
    .output("numbers")
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
  let mut notifications = Vec::new();
  while let Ok(notification) = receiver.try_recv() {
    notifications.push(notification);
  }
  notifications
}

#[tokio::test]
async fn test_observer_receives_elements_then_completion() {
  let pipeline = GraphCompiler::new().compile(&counting(3)).unwrap();
  assert_eq!(pipeline.name(), "counting");

  let (sender, mut receiver) = mpsc::unbounded_channel();
  let execution = pipeline.instantiate(sender);
  assert_eq!(execution.state(), ExecutionState::Created);

  execution.start().await;
  assert_eq!(execution.wait().await, ExecutionOutcome::Completed);
  assert_eq!(execution.state(), ExecutionState::Completed);

  let notifications = drain(&mut receiver);
  assert_eq!(notifications.len(), 4);
  assert!(matches!(notifications[0], Notification::Next(Value::Int32(0))));
  assert!(matches!(notifications[2], Notification::Next(Value::Int32(2))));
  assert!(matches!(notifications[3], Notification::Completed));
}

#[tokio::test]
async fn test_observer_receives_error_once() {
  let workflow = Workflow::new()
    .node(Node::new("numbers", "Range").with_property("count", 3))
    .node(Node::new("divide", "Divide").with_property("value", 0))
    .edge("numbers", "divide", 0)
    .output("divide");
  let pipeline = GraphCompiler::new().compile(&workflow).unwrap();

  let (sender, mut receiver) = mpsc::unbounded_channel();
  let execution = pipeline.instantiate(sender);
  execution.start().await;

  assert!(matches!(execution.wait().await, ExecutionOutcome::Failed(_)));
  assert_eq!(execution.state(), ExecutionState::Failed);
  let notifications = drain(&mut receiver);
  assert_eq!(notifications.len(), 1);
  assert!(matches!(notifications[0], Notification::Error(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_an_endless_pipeline() {
  let workflow = Workflow::new()
    .node(
      Node::new("ticks", "Timer")
        .with_property("due_time", 0)
        .with_property("period", 10),
    )
    .output("ticks");
  let config = EngineConfig {
    trace_elements: true,
    ..EngineConfig::default()
  };
  let pipeline = GraphCompiler::new().with_config(config).compile(&workflow).unwrap();
  assert_eq!(pipeline.output_type(), &streamweave_workflow::ElementType::Int64);

  let (sender, mut receiver) = mpsc::unbounded_channel();
  let execution = pipeline.instantiate(sender);
  execution.start().await;
  tokio::time::sleep(Duration::from_millis(35)).await;
  execution.cancel();

  assert_eq!(execution.wait().await, ExecutionOutcome::Cancelled);
  assert_eq!(execution.state(), ExecutionState::Cancelled);
  let notifications = drain(&mut receiver);
  assert!(!notifications.is_empty());
  assert!(
    notifications
      .iter()
      .all(|notification| matches!(notification, Notification::Next(_)))
  );
}

#[tokio::test]
async fn test_cancel_before_start_prevents_the_run() {
  let pipeline = GraphCompiler::new().compile(&counting(3)).unwrap();
  let (sender, mut receiver) = mpsc::unbounded_channel();
  let execution = pipeline.instantiate(sender);

  execution.cancel();
  execution.start().await;

  assert_eq!(execution.state(), ExecutionState::Cancelled);
  assert_eq!(execution.wait().await, ExecutionOutcome::Cancelled);
  assert!(drain(&mut receiver).is_empty());
}

#[tokio::test]
async fn test_pipeline_can_run_repeatedly() {
  let pipeline = GraphCompiler::new().compile(&counting(2)).unwrap();
  let first = pipeline.collect().await.unwrap();
  let second = pipeline.collect().await.unwrap();
  assert_eq!(first, second);
  assert_eq!(first, vec![Value::Int32(0), Value::Int32(1)]);
}

#[test]
fn test_engine_config_from_json() {
  let config = EngineConfig::from_json_str(r#"{ "name": "demo", "trace_elements": true }"#).unwrap();
  let pipeline = GraphCompiler::new()
    .with_config(config)
    .compile(&Workflow::new().node(Node::new("n", "Range").with_property("count", 1)))
    .unwrap();
  assert_eq!(pipeline.name(), "demo");
}
