//! # Multicast Sharing
//!
//! A [`Multicast`] hub turns one upstream [`Sequence`] into any number of
//! downstream consumers that share a single upstream subscription.
//!
//! ## Pull-driven distribution
//!
//! The hub has no task of its own. Whichever consumer is polled while its own
//! queue is empty pulls the next upstream element, and the element is pushed
//! into the queue of every consumer attached at that moment. Consumers that
//! attach later never see it (hot semantics), unless the hub keeps a replay
//! buffer, in which case new consumers start with the buffered history.
//!
//! Upstream wake-ups are fanned out to every waiting consumer through a
//! shared hub waker, so consumers may live on different tasks.
//!
//! ## Lifetimes
//!
//! - [`ShareMode::RefCount`]: the upstream is subscribed on first demand and
//!   dropped, together with any buffered state, when the last consumer goes
//!   away. A later consumer starts over with a fresh subscription.
//! - [`ShareMode::Scoped`]: the upstream stays subscribed for as long as the
//!   hub itself is alive. Used inside `Publish`/`Replay` nodes and feedback
//!   combinators, whose scope is one subscription of the owning node.
//!
//! ## Pull holds
//!
//! While a [`PullHold`] is alive, consumers drain what is already queued but
//! never advance the upstream. Sample-on-source combinators use this to let
//! a predicate catch up with the current element without racing ahead.

use crate::error::StreamError;
use crate::scheduler::Scheduler;
use crate::sequence::{ElementStream, Notification, Selector, Sequence, lock};
use crate::value::Value;
use futures::task::{ArcWake, waker};
use futures::{Stream, StreamExt, stream};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// How long a hub keeps its upstream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
  /// Connect on first demand, disconnect and reset when the last consumer
  /// leaves.
  RefCount,
  /// Stay connected for the lifetime of the hub.
  Scoped,
}

/// Bounds of a replay buffer. With both bounds set, an element is kept only
/// while it satisfies both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayPolicy {
  /// Maximum number of buffered elements.
  pub buffer_size: Option<usize>,
  /// Maximum age of buffered elements.
  pub window: Option<Duration>,
}

impl ReplayPolicy {
  /// An unbounded buffer.
  pub fn unbounded() -> Self {
    Self::default()
  }

  /// A buffer keeping the last `count` elements.
  pub fn last(count: usize) -> Self {
    Self {
      buffer_size: Some(count),
      window: None,
    }
  }
}

#[derive(Debug, Clone)]
enum Terminal {
  Completed,
  Failed(StreamError),
}

struct Replay {
  policy: ReplayPolicy,
  scheduler: Arc<dyn Scheduler>,
}

#[derive(Default)]
struct HubState {
  connection: Option<ElementStream>,
  terminal: Option<Terminal>,
  queues: HashMap<u64, VecDeque<Value>>,
  next_id: u64,
  buffer: VecDeque<(Instant, Value)>,
  holds: usize,
  held_waiters: bool,
}

impl HubState {
  fn trim(&mut self, policy: &ReplayPolicy, now: Instant) {
    if let Some(size) = policy.buffer_size {
      while self.buffer.len() > size {
        self.buffer.pop_front();
      }
    }
    if let Some(window) = policy.window {
      while self
        .buffer
        .front()
        .is_some_and(|(at, _)| now.saturating_duration_since(*at) > window)
      {
        self.buffer.pop_front();
      }
    }
  }

  fn distribute(&mut self, value: Value, replay: Option<&Replay>) {
    for queue in self.queues.values_mut() {
      queue.push_back(value.clone());
    }
    if let Some(replay) = replay {
      let now = replay.scheduler.now();
      self.buffer.push_back((now, value));
      self.trim(&replay.policy, now);
    }
  }
}

#[derive(Default)]
struct WakerSet {
  wakers: Mutex<HashMap<u64, Waker>>,
}

impl WakerSet {
  fn register(&self, id: u64, waker: &Waker) {
    let mut wakers = lock(&self.wakers);
    match wakers.get(&id) {
      Some(existing) if existing.will_wake(waker) => {}
      _ => {
        wakers.insert(id, waker.clone());
      }
    }
  }

  fn remove(&self, id: u64) {
    lock(&self.wakers).remove(&id);
  }

  fn wake_all_except(&self, skip: Option<u64>) {
    let woken: Vec<Waker> = {
      let mut wakers = lock(&self.wakers);
      let ids: Vec<u64> = wakers.keys().copied().filter(|id| Some(*id) != skip).collect();
      ids.into_iter().filter_map(|id| wakers.remove(&id)).collect()
    };
    for waker in woken {
      waker.wake();
    }
  }
}

impl ArcWake for WakerSet {
  fn wake_by_ref(arc_self: &Arc<Self>) {
    arc_self.wake_all_except(None);
  }
}

struct Shared {
  state: Mutex<HubState>,
  wakers: Arc<WakerSet>,
  hub_waker: Waker,
  upstream: Sequence,
  mode: ShareMode,
  replay: Option<Replay>,
}

/// A shared hub over one upstream sequence.
#[derive(Clone)]
pub struct Multicast {
  shared: Arc<Shared>,
}

impl Multicast {
  fn build(upstream: Sequence, mode: ShareMode, replay: Option<Replay>) -> Self {
    let wakers = Arc::new(WakerSet::default());
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(HubState::default()),
        hub_waker: waker(wakers.clone()),
        wakers,
        upstream,
        mode,
        replay,
      }),
    }
  }

  /// A hot hub without buffering.
  pub fn publish(upstream: Sequence, mode: ShareMode) -> Self {
    Self::build(upstream, mode, None)
  }

  /// A hub that buffers history for late consumers.
  pub fn replay(
    upstream: Sequence,
    policy: ReplayPolicy,
    scheduler: Arc<dyn Scheduler>,
    mode: ShareMode,
  ) -> Self {
    Self::build(upstream, mode, Some(Replay { policy, scheduler }))
  }

  /// Attaches a new consumer.
  pub fn consumer(&self) -> HubConsumer {
    let mut state = lock(&self.shared.state);
    let id = state.next_id;
    state.next_id += 1;

    let mut queue = VecDeque::new();
    if let Some(replay) = &self.shared.replay {
      state.trim(&replay.policy, replay.scheduler.now());
      queue.extend(state.buffer.iter().map(|(_, value)| value.clone()));
    }
    state.queues.insert(id, queue);

    HubConsumer {
      shared: self.shared.clone(),
      id,
      finished: false,
    }
  }

  /// A sequence whose every subscription attaches a new consumer.
  pub fn sequence(&self) -> Sequence {
    let hub = self.clone();
    Sequence::new(move || Box::pin(hub.consumer()))
  }

  /// Stops consumers from advancing the upstream until the hold is dropped.
  pub fn hold_pulls(&self) -> PullHold {
    lock(&self.shared.state).holds += 1;
    PullHold {
      shared: self.shared.clone(),
    }
  }

  /// Drives the upstream on a background task until the returned connection
  /// is dropped. Requires a tokio runtime.
  pub fn connect(&self) -> Connection {
    let mut consumer = self.consumer();
    let task = tokio::spawn(async move {
      while let Some(item) = consumer.next().await {
        if item.is_err() {
          break;
        }
      }
    });
    Connection { task: Some(task) }
  }

  /// Number of attached consumers.
  pub fn consumer_count(&self) -> usize {
    lock(&self.shared.state).queues.len()
  }

  /// Returns true while the upstream is subscribed.
  pub fn is_connected(&self) -> bool {
    lock(&self.shared.state).connection.is_some()
  }
}

/// One consumer of a [`Multicast`] hub.
pub struct HubConsumer {
  shared: Arc<Shared>,
  id: u64,
  finished: bool,
}

impl Stream for HubConsumer {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.finished {
      return Poll::Ready(None);
    }
    let shared = this.shared.clone();
    shared.wakers.register(this.id, cx.waker());

    let mut notify = false;
    let result = {
      let mut state = lock(&shared.state);
      loop {
        if let Some(value) = state.queues.get_mut(&this.id).and_then(VecDeque::pop_front) {
          break Poll::Ready(Some(Ok(value)));
        }
        if let Some(terminal) = &state.terminal {
          this.finished = true;
          break match terminal {
            Terminal::Completed => Poll::Ready(None),
            Terminal::Failed(error) => Poll::Ready(Some(Err(error.clone()))),
          };
        }
        if state.holds > 0 {
          state.held_waiters = true;
          break Poll::Pending;
        }

        if state.connection.is_none() {
          trace!(consumers = state.queues.len(), "hub connecting upstream");
          state.connection = Some(shared.upstream.subscribe());
        }
        let mut hub_cx = Context::from_waker(&shared.hub_waker);
        let polled = match state.connection.as_mut() {
          Some(connection) => connection.poll_next_unpin(&mut hub_cx),
          None => Poll::Ready(None),
        };
        match polled {
          Poll::Ready(Some(Ok(value))) => state.distribute(value, shared.replay.as_ref()),
          Poll::Ready(Some(Err(error))) => {
            trace!(error = %error, "hub upstream failed");
            state.terminal = Some(Terminal::Failed(error));
            state.connection = None;
          }
          Poll::Ready(None) => {
            trace!("hub upstream completed");
            state.terminal = Some(Terminal::Completed);
            state.connection = None;
          }
          Poll::Pending => break Poll::Pending,
        }
        notify = true;
      }
    };

    if notify {
      shared.wakers.wake_all_except(Some(this.id));
    }
    result
  }
}

impl Drop for HubConsumer {
  fn drop(&mut self) {
    self.shared.wakers.remove(self.id);
    let released = {
      let mut state = lock(&self.shared.state);
      state.queues.remove(&self.id);
      if state.queues.is_empty() && self.shared.mode == ShareMode::RefCount {
        state.terminal = None;
        state.buffer.clear();
        state.connection.take()
      } else {
        None
      }
    };
    if released.is_some() {
      trace!("hub released upstream after last consumer left");
    }
  }
}

/// Keeps hub consumers from pulling upstream while alive.
pub struct PullHold {
  shared: Arc<Shared>,
}

impl Drop for PullHold {
  fn drop(&mut self) {
    let wake = {
      let mut state = lock(&self.shared.state);
      state.holds = state.holds.saturating_sub(1);
      let wake = state.holds == 0 && state.held_waiters;
      if wake {
        state.held_waiters = false;
      }
      wake
    };
    if wake {
      self.shared.wakers.wake_all_except(None);
    }
  }
}

/// A background task driving a hub. Dropping it stops the task.
pub struct Connection {
  task: Option<JoinHandle<()>>,
}

impl Connection {
  /// Stops driving the hub.
  pub fn disconnect(mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for Connection {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Sequence {
  /// Shares one subscription of this sequence among all concurrent
  /// subscribers.
  pub fn share(&self) -> Sequence {
    Multicast::publish(self.clone(), ShareMode::RefCount).sequence()
  }

  /// Like [`Sequence::share`], replaying buffered history to late
  /// subscribers.
  pub fn share_replay(&self, policy: ReplayPolicy, scheduler: Arc<dyn Scheduler>) -> Sequence {
    Multicast::replay(self.clone(), policy, scheduler, ShareMode::RefCount).sequence()
  }
}

/// Runs `selector` on a hot shared view of `source`. Every subscription
/// creates a fresh hub scoped to that subscription.
pub fn publish_with(source: Sequence, selector: Selector) -> Sequence {
  Sequence::new(move || {
    let hub = Multicast::publish(source.clone(), ShareMode::Scoped);
    selector(hub.sequence()).subscribe()
  })
}

/// Runs `selector` on a replaying shared view of `source`. The source is
/// drained eagerly while the result is being consumed, so the buffer fills
/// even when no inner consumer is currently attached.
pub fn replay_with(
  source: Sequence,
  policy: ReplayPolicy,
  scheduler: Arc<dyn Scheduler>,
  selector: Selector,
) -> Sequence {
  Sequence::new(move || {
    let hub = Multicast::replay(source.clone(), policy, scheduler.clone(), ShareMode::Scoped);
    let driver = hub.consumer();
    let inner = selector(hub.sequence()).subscribe();
    Box::pin(EagerScope {
      driver: Some(driver),
      inner,
    })
  })
}

const EAGER_BUDGET: usize = 32;

struct EagerScope {
  driver: Option<HubConsumer>,
  inner: ElementStream,
}

impl Stream for EagerScope {
  type Item = Result<Value, StreamError>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let mut budget = EAGER_BUDGET;
    while let Some(driver) = self.driver.as_mut() {
      if budget == 0 {
        cx.waker().wake_by_ref();
        break;
      }
      match driver.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(_))) => budget -= 1,
        Poll::Ready(_) => self.driver = None,
        Poll::Pending => break,
      }
    }
    self.inner.poll_next_unpin(cx)
  }
}

/// A push handle feeding a shared hub.
///
/// Notifications sent before any consumer pulls are queued, so nothing is
/// lost between sending and the first subscription.
pub struct Subject {
  sender: mpsc::UnboundedSender<Notification>,
  hub: Multicast,
}

impl Default for Subject {
  fn default() -> Self {
    Self::new()
  }
}

impl Subject {
  /// A hot subject.
  pub fn new() -> Self {
    Self::build(None)
  }

  /// A subject replaying buffered history to late subscribers.
  pub fn replay(policy: ReplayPolicy, scheduler: Arc<dyn Scheduler>) -> Self {
    Self::build(Some(Replay { policy, scheduler }))
  }

  fn build(replay: Option<Replay>) -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    let receiver = Arc::new(Mutex::new(Some(receiver)));
    let upstream = Sequence::new(move || -> ElementStream {
      match lock(&receiver).take() {
        Some(receiver) => Box::pin(notifications(receiver)),
        None => Box::pin(stream::empty()),
      }
    });
    Self {
      sender,
      hub: Multicast::build(upstream, ShareMode::Scoped, replay),
    }
  }

  /// Pushes an element. Returns false once the subject has terminated.
  pub fn on_next(&self, value: Value) -> bool {
    self.sender.send(Notification::Next(value)).is_ok()
  }

  /// Terminates subscribers with an error.
  pub fn on_error(&self, error: StreamError) -> bool {
    self.sender.send(Notification::Error(error)).is_ok()
  }

  /// Completes subscribers.
  pub fn on_completed(&self) -> bool {
    self.sender.send(Notification::Completed).is_ok()
  }

  /// The subscriber side of the subject.
  pub fn sequence(&self) -> Sequence {
    self.hub.sequence()
  }
}

fn notifications(
  mut receiver: mpsc::UnboundedReceiver<Notification>,
) -> impl Stream<Item = Result<Value, StreamError>> + Send {
  async_stream::stream! {
    while let Some(notification) = receiver.recv().await {
      match notification {
        Notification::Next(value) => yield Ok(value),
        Notification::Error(error) => {
          yield Err(error);
          break;
        }
        Notification::Completed => break,
      }
    }
  }
}
