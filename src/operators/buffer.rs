//! # Triggered Buffers and Windows
//!
//! `BufferTrigger` collects source elements into lists and `TriggeredWindow`
//! splits them into sequence-valued windows. Both are driven by a second
//! trigger input, and the node's optional `count` and `time_span` properties
//! pick how a buffer closes:
//!
//! | `count` | `time_span` | Behavior |
//! |---|---|---|
//! | - | - | every trigger closes the current buffer and opens the next one |
//! | set | - | every trigger opens a buffer closed after `count` elements |
//! | - | set | every trigger opens a buffer closed after `time_span` |
//! | set | set | every trigger opens a buffer closed by whichever comes first |
//!
//! Buffers opened by separate triggers may overlap. When the source
//! completes, every open buffer is closed and emitted in opening order.
//! Windows are emitted as soon as they open and replay their content to late
//! subscribers.

use super::{first, invalid_property, optional};
use crate::error::StreamError;
use crate::multicast::{ReplayPolicy, Subject};
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::scheduler::Scheduler;
use crate::sequence::{ElementStream, Sequence};
use crate::types::ElementType;
use crate::value::Value;
use futures::{Future, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// How buffers close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closing {
  /// The next trigger closes the current buffer.
  NextTrigger,
  /// Each trigger opens a buffer closed by element count and/or time.
  After {
    /// Close after this many elements.
    count: Option<usize>,
    /// Close after this much time.
    time_span: Option<Duration>,
  },
}

impl Closing {
  /// Selects the closing rule from the optional node properties.
  pub fn select(count: Option<usize>, time_span: Option<Duration>) -> Self {
    match (count, time_span) {
      (None, None) => Closing::NextTrigger,
      (count, time_span) => Closing::After { count, time_span },
    }
  }
}

/// Collects `source` into lists delimited by `trigger`.
pub fn buffer_trigger(
  source: Sequence,
  trigger: Sequence,
  closing: Closing,
  scheduler: Arc<dyn Scheduler>,
) -> Sequence {
  triggered(source, trigger, closing, scheduler, false)
}

/// Splits `source` into windows delimited by `trigger`.
pub fn triggered_window(
  source: Sequence,
  trigger: Sequence,
  closing: Closing,
  scheduler: Arc<dyn Scheduler>,
) -> Sequence {
  triggered(source, trigger, closing, scheduler, true)
}

fn triggered(
  source: Sequence,
  trigger: Sequence,
  closing: Closing,
  scheduler: Arc<dyn Scheduler>,
  windowed: bool,
) -> Sequence {
  Sequence::new(move || {
    let mut stream = TriggeredStream {
      trigger: Some(trigger.subscribe()),
      source: Some(source.subscribe()),
      closing,
      scheduler: scheduler.clone(),
      windowed,
      open: VecDeque::new(),
      ready: VecDeque::new(),
      done: false,
    };
    if closing == Closing::NextTrigger {
      stream.open_slot();
    }
    Box::pin(stream)
  })
}

enum Collector {
  Buffer(Vec<Value>),
  Window(Subject),
}

struct Slot {
  collector: Collector,
  remaining: Option<usize>,
  timer: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

struct TriggeredStream {
  trigger: Option<ElementStream>,
  source: Option<ElementStream>,
  closing: Closing,
  scheduler: Arc<dyn Scheduler>,
  windowed: bool,
  open: VecDeque<Slot>,
  ready: VecDeque<Result<Value, StreamError>>,
  done: bool,
}

impl TriggeredStream {
  fn open_slot(&mut self) {
    let collector = if self.windowed {
      let subject = Subject::replay(ReplayPolicy::unbounded(), self.scheduler.clone());
      self.ready.push_back(Ok(Value::Sequence(subject.sequence())));
      Collector::Window(subject)
    } else {
      Collector::Buffer(Vec::new())
    };
    let (remaining, timer) = match self.closing {
      Closing::NextTrigger => (None, None),
      Closing::After { count, time_span } => (
        count,
        time_span.map(|span| self.scheduler.sleep_until(self.scheduler.now() + span)),
      ),
    };
    self.open.push_back(Slot {
      collector,
      remaining,
      timer,
    });
  }

  fn close_slot(&mut self, slot: Slot) {
    match slot.collector {
      Collector::Buffer(items) => self.ready.push_back(Ok(Value::List(items))),
      Collector::Window(subject) => {
        subject.on_completed();
      }
    }
  }

  fn close_where(&mut self, closed: impl Fn(&Slot) -> bool) {
    let open = std::mem::take(&mut self.open);
    for slot in open {
      if closed(&slot) {
        self.close_slot(slot);
      } else {
        self.open.push_back(slot);
      }
    }
  }

  fn on_trigger(&mut self) {
    if self.closing == Closing::NextTrigger {
      self.close_where(|_| true);
    }
    self.open_slot();
  }

  fn on_element(&mut self, value: Value) {
    for slot in self.open.iter_mut() {
      match &mut slot.collector {
        Collector::Buffer(items) => items.push(value.clone()),
        Collector::Window(subject) => {
          subject.on_next(value.clone());
        }
      }
      if let Some(remaining) = slot.remaining.as_mut() {
        *remaining = remaining.saturating_sub(1);
      }
    }
    self.close_where(|slot| slot.remaining == Some(0));
  }

  fn poll_timers(&mut self, cx: &mut Context<'_>) -> bool {
    let mut expired = false;
    for slot in self.open.iter_mut() {
      if let Some(timer) = slot.timer.as_mut() {
        if timer.as_mut().poll(cx).is_ready() {
          slot.timer = None;
          slot.remaining = Some(0);
          expired = true;
        }
      }
    }
    if expired {
      self.close_where(|slot| slot.remaining == Some(0));
    }
    expired
  }

  fn finish(&mut self) {
    self.close_where(|_| true);
    self.trigger = None;
    self.source = None;
    self.done = true;
  }

  fn fail(&mut self, error: StreamError) {
    for slot in self.open.drain(..) {
      if let Collector::Window(subject) = slot.collector {
        subject.on_error(error.clone());
      }
    }
    self.ready.push_back(Err(error));
    self.trigger = None;
    self.source = None;
    self.done = true;
  }
}

impl Stream for TriggeredStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      if let Some(item) = this.ready.pop_front() {
        return Poll::Ready(Some(item));
      }
      if this.done {
        return Poll::Ready(None);
      }

      let mut progressed = false;
      if let Some(trigger) = this.trigger.as_mut() {
        match trigger.poll_next_unpin(cx) {
          Poll::Ready(Some(Ok(_))) => {
            this.on_trigger();
            progressed = true;
          }
          Poll::Ready(Some(Err(error))) => {
            this.fail(error);
            continue;
          }
          Poll::Ready(None) => {
            this.trigger = None;
            if this.closing == Closing::NextTrigger {
              this.finish();
              continue;
            }
            progressed = true;
          }
          Poll::Pending => {}
        }
      }

      progressed |= this.poll_timers(cx);

      if let Some(source) = this.source.as_mut() {
        match source.poll_next_unpin(cx) {
          Poll::Ready(Some(Ok(value))) => {
            this.on_element(value);
            progressed = true;
          }
          Poll::Ready(Some(Err(error))) => {
            this.fail(error);
            continue;
          }
          Poll::Ready(None) => {
            this.finish();
            continue;
          }
          Poll::Pending => {}
        }
      }

      if !progressed {
        return Poll::Pending;
      }
    }
  }
}

fn triggered_set(kind: &str, windowed: bool) -> OverloadSet {
  OverloadSet::new(
    kind,
    vec![Overload::new(
      vec![TypePattern::Generic(0), TypePattern::Generic(1)],
      move |b| {
        let node = b.node;
        let count = optional(node, |p| p.get_usize("count"))?;
        if count == Some(0) {
          return Err(invalid_property(node, "count", "count must be positive"));
        }
        let time_span = optional(node, |p| p.get_duration("time_span"))?;
        let closing = Closing::select(count, time_span);
        let scheduler = b.ctx.scheduler();
        let output = if windowed {
          ElementType::sequence(b.slot(0).clone())
        } else {
          ElementType::list(b.slot(0).clone())
        };
        Ok(Stage::new(output, move |inputs: Vec<Sequence>| {
          let mut inputs = inputs.into_iter();
          let source = inputs.next().unwrap_or_else(Sequence::empty);
          let trigger = first(inputs.collect());
          triggered(source, trigger, closing, scheduler.clone(), windowed)
        }))
      },
    )],
  )
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(triggered_set("BufferTrigger", false));
  registry.register(triggered_set("TriggeredWindow", true));
}
