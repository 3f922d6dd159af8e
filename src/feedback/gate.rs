//! # Gate Family
//!
//! Gates let through the next source element after each opening signal and
//! drop everything else.
//!
//! - [`gate`]: the gate is open at subscription and re-opens on every gate
//!   element.
//! - [`gate_interval`]: the gate is open at subscription and re-opens every
//!   interval.
//! - [`timed_gate`]: every gate element opens a window that closes after a
//!   due time. Each open window lets through the first source element that
//!   arrives before it closes, so overlapping windows can each claim the same
//!   element.
//!
//! Gate signals that are ready at the same time as a source element are
//! processed first.

use crate::error::StreamError;
use crate::scheduler::{Scheduler, timer};
use crate::sequence::{ElementStream, Sequence};
use crate::value::Value;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;

/// Takes the next source element after each gate element.
pub fn gate(source: Sequence, gate: Sequence) -> Sequence {
  Sequence::new(move || {
    Box::pin(GateStream {
      gate: Some(gate.subscribe()),
      source: source.subscribe(),
      armed: true,
    })
  })
}

/// Takes the next source element in each interval.
pub fn gate_interval(source: Sequence, scheduler: Arc<dyn Scheduler>, interval: Duration) -> Sequence {
  gate(source, timer(scheduler, interval, Some(interval)))
}

struct GateStream {
  gate: Option<ElementStream>,
  source: ElementStream,
  armed: bool,
}

impl Stream for GateStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      while let Some(gate) = this.gate.as_mut() {
        match gate.poll_next_unpin(cx) {
          Poll::Ready(Some(Ok(_))) => this.armed = true,
          Poll::Ready(Some(Err(error))) => {
            this.gate = None;
            return Poll::Ready(Some(Err(error)));
          }
          Poll::Ready(None) => this.gate = None,
          Poll::Pending => break,
        }
      }

      match this.source.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(value))) => {
          if this.armed {
            this.armed = false;
            return Poll::Ready(Some(Ok(value)));
          }
        }
        other => return other,
      }
    }
  }
}

/// Takes the first source element arriving within `due_time` of each gate
/// element.
pub fn timed_gate(
  source: Sequence,
  gate: Sequence,
  scheduler: Arc<dyn Scheduler>,
  due_time: Duration,
) -> Sequence {
  Sequence::new(move || {
    Box::pin(TimedGateStream {
      gate: Some(gate.subscribe()),
      source: source.subscribe(),
      scheduler: scheduler.clone(),
      due_time,
      windows: VecDeque::new(),
      pending: None,
    })
  })
}

struct TimedGateStream {
  gate: Option<ElementStream>,
  source: ElementStream,
  scheduler: Arc<dyn Scheduler>,
  due_time: Duration,
  windows: VecDeque<Instant>,
  pending: Option<(Value, usize)>,
}

impl Stream for TimedGateStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      if let Some((value, remaining)) = this.pending.as_mut() {
        let value = value.clone();
        *remaining -= 1;
        if *remaining == 0 {
          this.pending = None;
        }
        return Poll::Ready(Some(Ok(value)));
      }

      while let Some(gate) = this.gate.as_mut() {
        match gate.poll_next_unpin(cx) {
          Poll::Ready(Some(Ok(_))) => {
            let deadline = this.scheduler.now() + this.due_time;
            this.windows.push_back(deadline);
          }
          Poll::Ready(Some(Err(error))) => {
            this.gate = None;
            return Poll::Ready(Some(Err(error)));
          }
          Poll::Ready(None) => this.gate = None,
          Poll::Pending => break,
        }
      }

      match this.source.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(value))) => {
          let now = this.scheduler.now();
          this.windows.retain(|deadline| now < *deadline);
          let open = this.windows.len();
          this.windows.clear();
          if open > 0 {
            this.pending = Some((value, open));
          }
        }
        other => return other,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::multicast::Subject;
  use crate::scheduler::TokioScheduler;

  fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Int32).collect()
  }

  #[tokio::test]
  async fn test_gate_is_open_at_start_and_rearms_per_signal() {
    let source = Subject::new();
    let signal = Subject::new();
    let mut gated = gate(source.sequence(), signal.sequence()).subscribe();

    source.on_next(Value::Int32(1));
    source.on_next(Value::Int32(2));
    assert_eq!(gated.next().await.unwrap().unwrap(), Value::Int32(1));

    signal.on_next(Value::Unit);
    source.on_next(Value::Int32(3));
    assert_eq!(gated.next().await.unwrap().unwrap(), Value::Int32(3));

    source.on_completed();
    assert!(gated.next().await.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_gate_interval_takes_one_per_interval() {
    let source = crate::scheduler::timer(
      Arc::new(TokioScheduler),
      Duration::from_millis(10),
      Some(Duration::from_millis(10)),
    )
    .take(10);
    let values = gate_interval(source, Arc::new(TokioScheduler), Duration::from_millis(33))
      .collect()
      .await
      .unwrap();

    // Ticks arrive every 10ms up to 100ms; the gate re-opens at 33ms, 66ms and 99ms.
    assert_eq!(
      values,
      vec![Value::Int64(0), Value::Int64(3), Value::Int64(6), Value::Int64(9)]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_timed_gate_drops_late_elements() {
    let source = Subject::new();
    let signal = Subject::new();
    let mut gated = timed_gate(
      source.sequence(),
      signal.sequence(),
      Arc::new(TokioScheduler),
      Duration::from_millis(50),
    )
    .subscribe();

    signal.on_next(Value::Unit);
    source.on_next(Value::Int32(1));
    source.on_next(Value::Int32(2));
    assert_eq!(gated.next().await.unwrap().unwrap(), Value::Int32(1));

    signal.on_next(Value::Unit);
    // Drain the gate signal before time moves on.
    assert!(futures::FutureExt::now_or_never(gated.next()).is_none());
    tokio::time::advance(Duration::from_millis(80)).await;
    source.on_next(Value::Int32(3));
    source.on_completed();
    assert!(gated.next().await.is_none());
  }

  #[tokio::test]
  async fn test_timed_gate_overlapping_windows_share_element() {
    let values = timed_gate(
      Sequence::from_values(ints(&[5])),
      Sequence::from_values(vec![Value::Unit, Value::Unit]),
      Arc::new(TokioScheduler),
      Duration::from_secs(60),
    )
    .collect()
    .await
    .unwrap();
    assert_eq!(values, ints(&[5, 5]));
  }
}
