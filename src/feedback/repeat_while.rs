//! Repetition controlled by a predicate sub-graph.
//!
//! The predicate sub-graph receives one `Unit` signal each time a pass over
//! the source completes. After sending the signal, the combinator waits for
//! the predicate's answer to that signal before deciding; the source is
//! subscribed again only when the answer is true. Answers the predicate
//! emits in the middle of a pass are latched but never decide a pass on
//! their own. If the predicate completes without answering, the last latched
//! answer decides, starting from `false`.

use crate::error::{Origin, StreamError};
use crate::feedback::latch::Latch;
use crate::multicast::Subject;
use crate::sequence::{ElementStream, Selector, Sequence};
use crate::value::Value;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// Repeats `source` while `predicate` answers true to the completion signal.
/// Failures of the combinator itself are attributed to `origin`.
pub fn repeat_while(source: Sequence, predicate: Selector, origin: Origin) -> Sequence {
  Sequence::new(move || {
    let signal = Subject::new();
    let predicate = predicate(signal.sequence()).subscribe();
    Box::pin(RepeatWhileStream {
      current: Some(source.subscribe()),
      source: source.clone(),
      signal,
      predicate: Some(predicate),
      latch: Latch::with_value(false),
      phase: Phase::Running,
      origin: origin.clone(),
      passes: 1,
    })
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  /// A pass over the source is in progress.
  Running,
  /// The pass completed and its signal was sent.
  Awaiting { answered: bool },
  Finished,
}

struct RepeatWhileStream {
  source: Sequence,
  current: Option<ElementStream>,
  signal: Subject,
  predicate: Option<ElementStream>,
  latch: Latch<bool>,
  phase: Phase,
  origin: Origin,
  passes: usize,
}

impl RepeatWhileStream {
  /// Latches every answer available without waiting. Returns true if at
  /// least one answer arrived.
  fn drain_predicate(&mut self, cx: &mut Context<'_>) -> Result<bool, StreamError> {
    let mut answered = false;
    while let Some(predicate) = self.predicate.as_mut() {
      match predicate.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(Value::Bool(value)))) => {
          self.latch.set(value);
          answered = true;
        }
        Poll::Ready(Some(Ok(other))) => {
          return Err(
            self
              .origin
              .failure(format!("predicate produced a non-boolean value {}", other))
              .with_item(other),
          );
        }
        Poll::Ready(Some(Err(error))) => return Err(error),
        Poll::Ready(None) => self.predicate = None,
        Poll::Pending => break,
      }
    }
    Ok(answered)
  }

  fn fail(&mut self, error: StreamError) -> Poll<Option<Result<Value, StreamError>>> {
    self.phase = Phase::Finished;
    self.current = None;
    self.predicate = None;
    Poll::Ready(Some(Err(error)))
  }
}

impl Stream for RepeatWhileStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      match this.phase {
        Phase::Finished => return Poll::Ready(None),
        Phase::Running => {
          // Keep the predicate moving so mid-pass answers do not pile up.
          if let Err(error) = this.drain_predicate(cx) {
            return this.fail(error);
          }
          let Some(current) = this.current.as_mut() else {
            this.phase = Phase::Finished;
            continue;
          };
          match current.poll_next_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Err(error))) => return this.fail(error),
            Poll::Ready(None) => {
              this.current = None;
              this.phase = Phase::Awaiting { answered: false };
              this.signal.on_next(Value::Unit);
            }
          }
        }
        Phase::Awaiting { answered } => {
          let answered = match this.drain_predicate(cx) {
            Ok(fresh) => answered || fresh,
            Err(error) => return this.fail(error),
          };
          if !answered && this.predicate.is_some() {
            this.phase = Phase::Awaiting { answered };
            return Poll::Pending;
          }
          if this.latch.get() != Some(true) {
            trace!(node = this.origin.id(), passes = this.passes, "repeat finished");
            this.phase = Phase::Finished;
            this.predicate = None;
            return Poll::Ready(None);
          }
          this.passes += 1;
          this.phase = Phase::Running;
          this.current = Some(this.source.subscribe());
        }
      }
    }
  }
}
