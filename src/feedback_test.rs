//! # Feedback Test Suite
//!
//! Predicate and accumulator sub-graphs driving the condition family, `Scan`
//! and `RepeatWhile`, with the sub-graphs written directly as selectors.

use crate::error::{Origin, StreamError};
use crate::feedback::{ConditionAction, condition, repeat_while, scan, scan_seeded};
use crate::sequence::{Selector, Sequence};
use crate::value::Value;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn ints(values: &[i32]) -> Sequence {
  Sequence::from_values(values.iter().copied().map(Value::Int32).collect())
}

fn int(value: &Value) -> i32 {
  match value {
    Value::Int32(value) => *value,
    other => panic!("expected Int32, found {other}"),
  }
}

fn origin() -> Origin {
  Origin::new("Feedback", "loop")
}

fn predicate(test: fn(i32) -> bool) -> Selector {
  Arc::new(move |shared: Sequence| shared.map(move |value| Ok(Value::Bool(test(int(&value))))))
}

fn collect_ints(sequence: Sequence) -> Vec<i32> {
  let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
  runtime
    .block_on(sequence.collect())
    .unwrap()
    .iter()
    .map(int)
    .collect()
}

#[tokio::test]
async fn test_condition_keeps_elements_sampled_true() {
  let output = condition(ints(&[1, 2, 3, 4, 5]), predicate(|v| v > 2), ConditionAction::Where, origin());
  assert_eq!(output.collect().await.unwrap(), ints(&[3, 4, 5]).collect().await.unwrap());
}

#[tokio::test]
async fn test_take_while_completes_on_first_false() {
  let output = condition(ints(&[1, 2, 7, 1]), predicate(|v| v < 3), ConditionAction::TakeWhile, origin());
  assert_eq!(output.collect().await.unwrap(), vec![Value::Int32(1), Value::Int32(2)]);
}

#[tokio::test]
async fn test_skip_while_passes_everything_after_first_false() {
  let output = condition(ints(&[1, 5, 2]), predicate(|v| v < 3), ConditionAction::SkipWhile, origin());
  assert_eq!(output.collect().await.unwrap(), vec![Value::Int32(5), Value::Int32(2)]);
}

#[tokio::test]
async fn test_condition_without_sample_drops_element() {
  let sparse: Selector = Arc::new(|shared: Sequence| {
    shared.filter_map(|value| Ok((int(&value) >= 2).then_some(Value::Bool(true))))
  });
  let output = condition(ints(&[1, 2, 3]), sparse, ConditionAction::Where, origin());
  assert_eq!(output.collect().await.unwrap(), vec![Value::Int32(2), Value::Int32(3)]);
}

#[tokio::test]
async fn test_condition_predicate_error_terminates() {
  let failing: Selector = Arc::new(|shared: Sequence| {
    shared.map(|value| match int(&value) {
      2 => Err(StreamError::message("bad predicate")),
      _ => Ok(Value::Bool(true)),
    })
  });
  let mut seen = Vec::new();
  let mut output = condition(ints(&[1, 2, 3]), failing, ConditionAction::Where, origin()).subscribe();
  while let Some(item) = futures::StreamExt::next(&mut output).await {
    seen.push(item.map_err(|error| error.message_text()));
  }
  assert_eq!(seen.len(), 2);
  assert_eq!(seen[0], Ok(Value::Int32(1)));
  assert!(seen[1].as_ref().unwrap_err().contains("bad predicate"));
}

fn running_total() -> Selector {
  Arc::new(|snapshots: Sequence| {
    snapshots.map(|snapshot| {
      let (total, value) = snapshot.pair().map(|(a, b)| (int(a), int(b))).unwrap_or_default();
      Ok(Value::Int32(total + value))
    })
  })
}

#[tokio::test]
async fn test_scan_without_seed_passes_first_element() {
  let output = scan(ints(&[1, 2, 3]), running_total());
  assert_eq!(output.collect().await.unwrap(), ints(&[1, 3, 6]).collect().await.unwrap());
}

#[tokio::test]
async fn test_scan_with_seed_starts_from_seed() {
  let output = scan_seeded(ints(&[1, 2, 3]), ints(&[10]), running_total());
  assert_eq!(output.collect().await.unwrap(), ints(&[11, 13, 16]).collect().await.unwrap());
}

#[tokio::test]
async fn test_scan_of_empty_source_is_empty() {
  let output = scan(ints(&[]), running_total());
  assert!(output.collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeat_while_repeats_until_predicate_is_false() {
  let passes: Selector = Arc::new(|signals: Sequence| {
    let completed = Arc::new(AtomicUsize::new(0));
    signals.map(move |_| {
      let count = completed.fetch_add(1, Ordering::SeqCst) + 1;
      Ok(Value::Bool(count < 3))
    })
  });
  let output = repeat_while(ints(&[1, 2]), passes, origin());
  assert_eq!(
    output.collect().await.unwrap(),
    ints(&[1, 2, 1, 2, 1, 2]).collect().await.unwrap()
  );
}

#[tokio::test]
async fn test_repeat_while_resubscribes_source() {
  let subscriptions = Arc::new(AtomicUsize::new(0));
  let counter = subscriptions.clone();
  let source = Sequence::new(move || {
    counter.fetch_add(1, Ordering::SeqCst);
    ints(&[7]).subscribe()
  });
  let twice: Selector = Arc::new(|signals: Sequence| {
    let seen = Arc::new(AtomicUsize::new(0));
    signals.map(move |_| Ok(Value::Bool(seen.fetch_add(1, Ordering::SeqCst) == 0)))
  });
  let values = repeat_while(source, twice, origin()).collect().await.unwrap();
  assert_eq!(values, vec![Value::Int32(7), Value::Int32(7)]);
  assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
}

/// Answers true to the first `passes` completion signals.
fn repeat_passes(passes: usize) -> Selector {
  Arc::new(move |signals: Sequence| {
    let completed = Arc::new(AtomicUsize::new(0));
    signals.map(move |_| Ok(Value::Bool(completed.fetch_add(1, Ordering::SeqCst) < passes)))
  })
}

#[tokio::test]
async fn test_repeat_while_decides_on_fresh_answer_over_long_runs() {
  let values = repeat_while(ints(&[1, 2]), repeat_passes(300), origin())
    .collect()
    .await
    .unwrap();
  assert_eq!(values.len(), 2 * 301);
}

#[tokio::test]
async fn test_repeat_while_waits_for_delayed_answer() {
  let delayed: Selector = Arc::new(|signals: Sequence| {
    let completed = Arc::new(AtomicUsize::new(0));
    let answers = signals.map(move |_| Ok(Value::Bool(completed.fetch_add(1, Ordering::SeqCst) < 2)));
    Sequence::new(move || {
      let mut answers = answers.subscribe();
      Box::pin(async_stream::stream! {
        while let Some(answer) = futures::StreamExt::next(&mut answers).await {
          tokio::time::sleep(std::time::Duration::from_millis(5)).await;
          yield answer;
        }
      })
    })
  });
  let values = repeat_while(ints(&[4]), delayed, origin()).collect().await.unwrap();
  assert_eq!(values, ints(&[4, 4, 4]).collect().await.unwrap());
}

#[tokio::test]
async fn test_non_boolean_answer_is_attributed_to_node() {
  let wrong: Selector = Arc::new(|signals: Sequence| signals.map(|_| Ok(Value::Int32(1))));
  let error = repeat_while(ints(&[1]), wrong, Origin::new("RepeatWhile", "again"))
    .collect()
    .await
    .unwrap_err();
  assert_eq!(error.component.name, "again");
  assert_eq!(error.component.type_name, "RepeatWhile");
}

#[tokio::test]
async fn test_non_boolean_sample_is_attributed_to_condition_node() {
  let wrong: Selector = Arc::new(|shared: Sequence| shared.map(|_| Ok(Value::from("yes"))));
  let error = condition(ints(&[1, 2]), wrong, ConditionAction::Where, Origin::new("Where", "filter"))
    .collect()
    .await
    .unwrap_err();
  assert_eq!(error.component.name, "filter");
  assert_eq!(error.component.type_name, "Where");
  assert_eq!(error.context.item, Some(Value::from("yes")));
}

proptest! {
  #[test]
  fn test_always_true_condition_is_identity(values in prop::collection::vec(any::<i32>(), 0..32)) {
    let output = condition(ints(&values), predicate(|_| true), ConditionAction::Where, origin());
    prop_assert_eq!(collect_ints(output), values);
  }

  #[test]
  fn test_always_false_condition_is_empty(values in prop::collection::vec(any::<i32>(), 0..32)) {
    let output = condition(ints(&values), predicate(|_| false), ConditionAction::Where, origin());
    prop_assert!(collect_ints(output).is_empty());
  }

  #[test]
  fn test_scan_matches_prefix_sums(values in prop::collection::vec(-1000i32..1000, 0..32)) {
    let expected: Vec<i32> = values
      .iter()
      .scan(None, |total: &mut Option<i32>, value| {
        let next = total.map_or(*value, |total| total + value);
        *total = Some(next);
        Some(next)
      })
      .collect();
    prop_assert_eq!(collect_ints(scan(ints(&values), running_total())), expected);
  }

  #[test]
  fn test_repeat_while_output_length(passes in 0usize..500, values in prop::collection::vec(any::<i32>(), 1..4)) {
    let output = collect_ints(repeat_while(ints(&values), repeat_passes(passes), origin()));
    prop_assert_eq!(output.len(), (passes + 1) * values.len());
  }
}
