//! # Scan
//!
//! Accumulation driven by an accumulator sub-graph. Every source element is
//! paired with the current memory into an
//! [`ElementAccumulation`](crate::accumulation::ElementAccumulation)
//! snapshot and fed to the sub-graph; each value the sub-graph emits becomes
//! the new memory and is forwarded downstream.
//!
//! Memory lives in a mutex-guarded cell created per subscription. It is only
//! written when the sub-graph emits, and read under the same lock when the
//! next snapshot is built, so iteration `n + 1` always sees the result of
//! iteration `n`.

use crate::error::StreamError;
use crate::multicast::publish_with;
use crate::sequence::{Selector, Sequence, lock};
use crate::value::Value;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// Scan without a seed: the first source element is emitted unchanged and
/// becomes the initial memory.
pub fn scan(source: Sequence, accumulator: Selector) -> Sequence {
  Sequence::new(move || {
    let memory: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let snapshot_memory = memory.clone();
    let accumulator = accumulator.clone();
    let body = publish_with(
      source.clone(),
      Arc::new(move |ps: Sequence| {
        let memory = snapshot_memory.clone();
        let snapshots = ps.map(move |value| {
          let accumulation = lock(&memory)
            .clone()
            .ok_or_else(|| StreamError::operator("Scan", "memory", "accumulation has no initial value"))?;
          Ok(Value::accumulation(accumulation, value))
        });
        Sequence::concat(vec![ps.take(1), accumulator(snapshots)])
      }),
    );

    Box::pin(body.subscribe().map(move |item| {
      if let Ok(value) = &item {
        *lock(&memory) = Some(value.clone());
      }
      item
    }))
  })
}

/// Scan with a seed: the first seed element becomes the initial memory, then
/// the source drives accumulation.
pub fn scan_seeded(source: Sequence, seed: Sequence, accumulator: Selector) -> Sequence {
  Sequence::new(move || {
    let mut seeds = seed.subscribe();
    let source = source.clone();
    let accumulator = accumulator.clone();
    Box::pin(async_stream::stream! {
      let initial = seeds.next().await;
      drop(seeds);
      let initial = match initial {
        Some(Ok(value)) => value,
        Some(Err(error)) => {
          yield Err(error);
          return;
        }
        None => return,
      };

      let memory = Arc::new(Mutex::new(initial));
      let snapshot_memory = memory.clone();
      let snapshots = source.map(move |value| {
        let accumulation = lock(&snapshot_memory).clone();
        Ok(Value::accumulation(accumulation, value))
      });

      let mut results = accumulator(snapshots).subscribe();
      while let Some(item) = results.next().await {
        if let Ok(value) = &item {
          *lock(&memory) = value.clone();
        }
        yield item;
      }
    })
  })
}
