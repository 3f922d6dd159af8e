//! # Side-Effect Test Suite

use crate::error::StreamError;
use crate::sequence::{Selector, Sequence};
use crate::side_effect::side_effect;
use crate::value::Value;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

fn letters(values: &[&str]) -> Sequence {
  Sequence::from_values(values.iter().map(|v| Value::String(v.to_string())).collect())
}

fn recorder(seen: Arc<Mutex<Vec<Value>>>) -> Selector {
  Arc::new(move |shared: Sequence| {
    let seen = seen.clone();
    shared.inspect(move |value| seen.lock().unwrap().push(value.clone()))
  })
}

#[tokio::test]
async fn test_output_passes_through_while_effect_observes_everything() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let output = side_effect(letters(&["a", "b", "c"]), recorder(seen.clone()));
  let values = output.collect().await.unwrap();
  assert_eq!(values, letters(&["a", "b", "c"]).collect().await.unwrap());
  assert_eq!(*seen.lock().unwrap(), values);
}

#[tokio::test]
async fn test_effect_sees_element_before_output_advances() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let mut output = side_effect(letters(&["a", "b", "c"]), recorder(seen.clone())).subscribe();
  let first = output.next().await.unwrap().unwrap();
  assert_eq!(first, Value::String("a".to_string()));
  assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_effect_error_follows_triggering_element() {
  let failing: Selector = Arc::new(|shared: Sequence| {
    shared.map(|value| match &value {
      Value::String(s) if s == "b" => Err(StreamError::message("sink failed")),
      _ => Ok(value),
    })
  });
  let mut output = side_effect(letters(&["a", "b", "c"]), failing).subscribe();
  let mut values = Vec::new();
  let mut error = None;
  while let Some(item) = output.next().await {
    match item {
      Ok(value) => values.push(value),
      Err(e) => error = Some(e),
    }
  }
  assert_eq!(values, letters(&["a", "b"]).collect().await.unwrap());
  assert!(error.unwrap().message_text().contains("sink failed"));
}

#[tokio::test]
async fn test_effect_completion_ends_output() {
  let output = side_effect(letters(&["a", "b", "c"]), Arc::new(|shared: Sequence| shared.take(1)));
  assert_eq!(output.collect().await.unwrap(), letters(&["a"]).collect().await.unwrap());
}

#[tokio::test]
async fn test_each_subscription_runs_its_own_effect() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let output = side_effect(letters(&["x"]), recorder(seen.clone()));
  output.collect().await.unwrap();
  output.collect().await.unwrap();
  assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_effect_error_reaches_output_after_source_completes() {
  let late: Selector = Arc::new(|shared: Sequence| {
    let failure = Sequence::new(|| {
      Box::pin(async_stream::stream! {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        yield Err(StreamError::message("late sink failure"));
      })
    });
    Sequence::concat(vec![shared.filter_map(|_| Ok(None)), failure])
  });
  let mut output = side_effect(letters(&["a", "b", "c"]), late).subscribe();
  let mut values = Vec::new();
  let mut errors = Vec::new();
  while let Some(item) = output.next().await {
    match item {
      Ok(value) => values.push(value),
      Err(error) => errors.push(error.message_text()),
    }
  }
  assert_eq!(values, letters(&["a", "b", "c"]).collect().await.unwrap());
  assert_eq!(errors, vec!["late sink failure".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_output_waits_for_slow_effect_to_complete() {
  let slow: Selector = Arc::new(|shared: Sequence| {
    let pause = Sequence::new(|| {
      Box::pin(async_stream::stream! {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        yield Ok(Value::Unit);
      })
    });
    Sequence::concat(vec![shared, pause])
  });
  let values = side_effect(letters(&["a"]), slow).collect().await.unwrap();
  assert_eq!(values, letters(&["a"]).collect().await.unwrap());
}
