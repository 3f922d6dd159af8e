//! Clock abstraction for time-based operators.
//!
//! Time-based operators never read the system clock directly. They go through
//! an injected [`Scheduler`], so hosts can swap in their own clock and tests
//! can run on tokio's paused clock.

use crate::error::StreamError;
use crate::sequence::Sequence;
use crate::value::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A source of time and timed wake-ups.
pub trait Scheduler: Send + Sync + fmt::Debug {
  /// The current instant.
  fn now(&self) -> Instant;

  /// Completes at `deadline`.
  fn sleep_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// The default scheduler, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
  fn now(&self) -> Instant {
    Instant::now()
  }

  fn sleep_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(tokio::time::sleep_until(deadline))
  }
}

/// Emits `0` after `due_time`, then `1, 2, ..` every `period` if set.
///
/// Ticks are scheduled from the subscription instant, so a slow consumer
/// receives the missed ticks back to back.
pub fn timer(scheduler: Arc<dyn Scheduler>, due_time: Duration, period: Option<Duration>) -> Sequence {
  Sequence::new(move || {
    let scheduler = scheduler.clone();
    let start = scheduler.now();
    Box::pin(async_stream::stream! {
      let mut deadline = start + due_time;
      let mut tick: i64 = 0;
      loop {
        scheduler.sleep_until(deadline).await;
        yield Ok::<Value, StreamError>(Value::Int64(tick));
        match period {
          Some(period) => {
            tick += 1;
            deadline += period;
          }
          None => break,
        }
      }
    })
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;

  #[tokio::test(start_paused = true)]
  async fn test_periodic_timer_ticks_on_schedule() {
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);
    let start = Instant::now();
    let mut ticks = timer(
      scheduler,
      Duration::from_millis(100),
      Some(Duration::from_millis(50)),
    )
    .subscribe();

    assert_eq!(ticks.next().await.unwrap().unwrap(), Value::Int64(0));
    assert_eq!(start.elapsed(), Duration::from_millis(100));
    assert_eq!(ticks.next().await.unwrap().unwrap(), Value::Int64(1));
    assert_eq!(start.elapsed(), Duration::from_millis(150));
  }

  #[tokio::test(start_paused = true)]
  async fn test_single_shot_timer_completes() {
    let values = timer(Arc::new(TokioScheduler), Duration::from_millis(10), None)
      .collect()
      .await
      .unwrap();
    assert_eq!(values, vec![Value::Int64(0)]);
  }
}
