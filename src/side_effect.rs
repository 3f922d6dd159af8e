//! # Side-Effect Merge
//!
//! Backs the `Sink` and `Visualizer` operators. The source is shared between
//! the pass-through output and an effect sub-graph; the output forwards every
//! source element unchanged while the effect sub-graph runs alongside it.
//!
//! Values emitted by the effect sub-graph are discarded. Its errors, however,
//! terminate the output right after the element that triggered them, and its
//! completion terminates the output the same way. When the source completes
//! first, the output completes only after the effect sub-graph has finished,
//! so a late effect error still reaches the output.
//!
//! The effect sub-graph is drained after every source element under a pull
//! hold, so it observes element `n` before the output may advance to element
//! `n + 1`.

use crate::error::StreamError;
use crate::multicast::{HubConsumer, Multicast, ShareMode};
use crate::sequence::{ElementStream, Selector, Sequence};
use crate::value::Value;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// Forwards `source` unchanged while running `selector` over it for effect.
pub fn side_effect(source: Sequence, selector: Selector) -> Sequence {
  Sequence::new(move || {
    let hub = Multicast::publish(source.clone(), ShareMode::Scoped);
    let main = hub.consumer();
    let effects = selector(hub.sequence()).subscribe();
    Box::pin(SideEffectStream {
      hub,
      main,
      effects: Some(effects),
      stashed: None,
      main_done: false,
      finished: false,
    })
  })
}

enum EffectOutcome {
  Running,
  Completed,
  Failed(StreamError),
}

struct SideEffectStream {
  hub: Multicast,
  main: HubConsumer,
  effects: Option<ElementStream>,
  stashed: Option<StreamError>,
  main_done: bool,
  finished: bool,
}

impl SideEffectStream {
  fn drain_effects(&mut self, cx: &mut Context<'_>) -> EffectOutcome {
    while let Some(effects) = self.effects.as_mut() {
      match effects.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(_))) => {}
        Poll::Ready(Some(Err(error))) => {
          self.effects = None;
          return EffectOutcome::Failed(error);
        }
        Poll::Ready(None) => {
          self.effects = None;
          return EffectOutcome::Completed;
        }
        Poll::Pending => break,
      }
    }
    EffectOutcome::Running
  }

  /// Polls the effect sub-graph while the main stream has nothing to offer.
  /// Once the main stream has completed, the output stays open until the
  /// effect sub-graph completes or fails.
  fn poll_remaining_effects(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Value, StreamError>>> {
    match self.drain_effects(cx) {
      EffectOutcome::Running => Poll::Pending,
      EffectOutcome::Completed => {
        self.finished = true;
        Poll::Ready(None)
      }
      EffectOutcome::Failed(error) => {
        self.finished = true;
        Poll::Ready(Some(Err(error)))
      }
    }
  }

  fn drain_effects_held(&mut self, cx: &mut Context<'_>) -> EffectOutcome {
    let _hold = self.hub.hold_pulls();
    self.drain_effects(cx)
  }
}

impl Stream for SideEffectStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if let Some(error) = this.stashed.take() {
      this.finished = true;
      return Poll::Ready(Some(Err(error)));
    }
    if this.finished {
      return Poll::Ready(None);
    }
    if this.main_done {
      return this.poll_remaining_effects(cx);
    }

    match this.main.poll_next_unpin(cx) {
      Poll::Ready(Some(Ok(element))) => {
        match this.drain_effects_held(cx) {
          EffectOutcome::Running => {}
          EffectOutcome::Completed => {
            trace!("effect sub-graph completed early");
            this.finished = true;
          }
          EffectOutcome::Failed(error) => this.stashed = Some(error),
        }
        Poll::Ready(Some(Ok(element)))
      }
      Poll::Ready(Some(Err(error))) => {
        this.finished = true;
        Poll::Ready(Some(Err(error)))
      }
      Poll::Ready(None) => {
        this.main_done = true;
        this.poll_remaining_effects(cx)
      }
      Poll::Pending => this.poll_remaining_effects(cx),
    }
  }
}
