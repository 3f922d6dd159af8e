//! # Condition Family
//!
//! `Condition`, `TakeWhile` and `SkipWhile` share one mechanism:
//!
//! 1. the main stream is published on a scoped hub;
//! 2. the predicate sub-graph is subscribed on the shared stream and every
//!    boolean it emits is written into a [`Latch`];
//! 3. each main element is sampled against the latch, so exactly one decision
//!    is made per main element, in source order.
//!
//! Before deciding on an element, the predicate is drained of everything it
//! can produce without pulling further main elements. A predicate that lags
//! behind (for instance one driven by a timer) is sampled at whatever value
//! it last produced. While nothing has been latched yet, elements are not
//! passed.

use crate::error::{Origin, StreamError};
use crate::feedback::latch::Latch;
use crate::multicast::{HubConsumer, Multicast, ShareMode};
use crate::sequence::{ElementStream, Selector, Sequence};
use crate::value::Value;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// What to do with the sampled predicate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionAction {
  /// Pass elements whose sample is true.
  Where,
  /// Pass elements while the sample is true, then complete.
  TakeWhile,
  /// Drop elements while the sample is true, then pass everything.
  SkipWhile,
}

/// Filters `source` by a predicate sub-graph sampled once per element.
/// Failures of the combinator itself are attributed to `origin`.
pub fn condition(
  source: Sequence,
  predicate: Selector,
  action: ConditionAction,
  origin: Origin,
) -> Sequence {
  Sequence::new(move || {
    let hub = Multicast::publish(source.clone(), ShareMode::Scoped);
    let main = hub.consumer();
    let predicate = predicate(hub.sequence()).subscribe();
    Box::pin(ConditionStream {
      hub,
      main,
      predicate: Some(predicate),
      latch: Latch::new(),
      action,
      origin: origin.clone(),
      passing: false,
      finished: false,
    })
  })
}

struct ConditionStream {
  hub: Multicast,
  main: HubConsumer,
  predicate: Option<ElementStream>,
  latch: Latch<bool>,
  action: ConditionAction,
  origin: Origin,
  passing: bool,
  finished: bool,
}

impl ConditionStream {
  fn drain_predicate(&mut self, cx: &mut Context<'_>) -> Result<(), StreamError> {
    let _hold = self.hub.hold_pulls();
    while let Some(predicate) = self.predicate.as_mut() {
      match predicate.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(Value::Bool(value)))) => self.latch.set(value),
        Poll::Ready(Some(Ok(other))) => {
          return Err(
            self
              .origin
              .failure(format!("predicate produced a non-boolean value {}", other))
              .with_item(other),
          );
        }
        Poll::Ready(Some(Err(error))) => return Err(error),
        Poll::Ready(None) => {
          trace!("condition predicate completed, keeping last sample");
          self.predicate = None;
        }
        Poll::Pending => break,
      }
    }
    Ok(())
  }
}

impl Stream for ConditionStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      if this.finished {
        return Poll::Ready(None);
      }
      let element = match this.main.poll_next_unpin(cx) {
        Poll::Pending => return Poll::Pending,
        Poll::Ready(None) => {
          this.finished = true;
          return Poll::Ready(None);
        }
        Poll::Ready(Some(Err(error))) => {
          this.finished = true;
          return Poll::Ready(Some(Err(error)));
        }
        Poll::Ready(Some(Ok(element))) => element,
      };

      if this.passing {
        return Poll::Ready(Some(Ok(element)));
      }
      if let Err(error) = this.drain_predicate(cx) {
        this.finished = true;
        return Poll::Ready(Some(Err(error)));
      }

      match (this.action, this.latch.get()) {
        (_, None) => continue,
        (ConditionAction::Where, Some(true)) | (ConditionAction::TakeWhile, Some(true)) => {
          return Poll::Ready(Some(Ok(element)));
        }
        (ConditionAction::Where, Some(false)) => continue,
        (ConditionAction::TakeWhile, Some(false)) => {
          this.finished = true;
          this.predicate = None;
          return Poll::Ready(None);
        }
        (ConditionAction::SkipWhile, Some(true)) => continue,
        (ConditionAction::SkipWhile, Some(false)) => {
          this.passing = true;
          this.predicate = None;
          return Poll::Ready(Some(Ok(element)));
        }
      }
    }
  }
}
