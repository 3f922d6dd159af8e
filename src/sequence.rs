//! # Sequences
//!
//! A [`Sequence`] is a cold, re-instantiable stream definition. Calling
//! [`Sequence::subscribe`] creates a fresh [`ElementStream`] with its own
//! state; dropping that stream tears the subscription down, including every
//! nested subscription it owns.
//!
//! ## Subscription model
//!
//! Combinators subscribe to their upstream sequences eagerly, when their own
//! stream is created, and not on first poll. This makes registration with
//! shared hubs (see [`crate::multicast`]) happen in subscription order, which
//! is what hot sharing semantics rely on. Sequential combinators such as
//! [`Sequence::concat`] subscribe to later parts only once the earlier ones
//! have completed.
//!
//! ## Errors
//!
//! A stream yields at most one `Err` item and ends right after it. This is
//! enforced once, by the wrapper returned from `subscribe`.

use crate::error::StreamError;
use crate::value::Value;
use futures::stream::{self, SelectAll};
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

/// The stream type produced by every subscription.
pub type ElementStream = Pin<Box<dyn Stream<Item = Result<Value, StreamError>> + Send>>;

/// Element transformation used by [`Sequence::map`].
pub type MapFn = Arc<dyn Fn(Value) -> Result<Value, StreamError> + Send + Sync>;

/// A function from sequences to sequences, used for nested workflows.
pub type Selector = Arc<dyn Fn(Sequence) -> Sequence + Send + Sync>;

type Factory = Arc<dyn Fn() -> ElementStream + Send + Sync>;

/// Locks a mutex, recovering the data if another holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single notification of a push source.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
  /// An element.
  Next(Value),
  /// A terminal error.
  Error(StreamError),
  /// Successful completion.
  Completed,
}

/// A cold stream definition.
#[derive(Clone)]
pub struct Sequence {
  factory: Factory,
}

impl fmt::Debug for Sequence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sequence")
      .field("id", &self.identity())
      .finish()
  }
}

impl Sequence {
  /// Creates a sequence from a stream factory. The factory runs once per
  /// subscription.
  pub fn new<F>(factory: F) -> Self
  where
    F: Fn() -> ElementStream + Send + Sync + 'static,
  {
    Self {
      factory: Arc::new(factory),
    }
  }

  /// Creates a sequence from a factory returning any sendable stream.
  pub fn from_stream<F, S>(factory: F) -> Self
  where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<Value, StreamError>> + Send + 'static,
  {
    Self::new(move || Box::pin(factory()))
  }

  /// Starts a new, independent subscription.
  pub fn subscribe(&self) -> ElementStream {
    Box::pin(StopOnError::new((self.factory)()))
  }

  /// Returns true if both handles refer to the same definition.
  pub fn ptr_eq(&self, other: &Sequence) -> bool {
    Arc::ptr_eq(&self.factory, &other.factory)
  }

  /// A stable identity for this definition, used for hashing.
  pub fn identity(&self) -> usize {
    Arc::as_ptr(&self.factory) as *const () as usize
  }

  /// A sequence that completes immediately.
  pub fn empty() -> Self {
    Self::new(|| Box::pin(stream::empty()))
  }

  /// A sequence that never emits and never completes.
  pub fn never() -> Self {
    Self::new(|| Box::pin(stream::pending()))
  }

  /// A sequence that fails immediately.
  pub fn fail(error: StreamError) -> Self {
    Self::new(move || Box::pin(stream::iter([Err::<Value, StreamError>(error.clone())])))
  }

  /// A sequence replaying a fixed list of values.
  pub fn from_values(values: Vec<Value>) -> Self {
    let values = Arc::new(values);
    Self::new(move || {
      let values = values.clone();
      Box::pin(stream::iter((0..values.len()).map(move |i| Ok::<Value, StreamError>(values[i].clone()))))
    })
  }

  /// A sequence emitting a single value.
  pub fn once(value: Value) -> Self {
    Self::from_values(vec![value])
  }

  /// Transforms every element. An `Err` from `f` terminates the stream.
  pub fn map<F>(&self, f: F) -> Self
  where
    F: Fn(Value) -> Result<Value, StreamError> + Send + Sync + 'static,
  {
    self.map_with(Arc::new(f))
  }

  /// Like [`Sequence::map`], taking a shared function.
  pub fn map_with(&self, f: MapFn) -> Self {
    let source = self.clone();
    Self::new(move || {
      let f = f.clone();
      Box::pin(source.subscribe().map(move |item| item.and_then(|value| f(value))))
    })
  }

  /// Keeps the elements for which `f` returns `Some`.
  pub fn filter_map<F>(&self, f: F) -> Self
  where
    F: Fn(Value) -> Result<Option<Value>, StreamError> + Send + Sync + 'static,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Self::new(move || {
      let f = f.clone();
      Box::pin(source.subscribe().filter_map(move |item| {
        let out = match item {
          Ok(value) => f(value).transpose(),
          Err(e) => Some(Err(e)),
        };
        futures::future::ready(out)
      }))
    })
  }

  /// Runs `f` on every element before passing it on.
  pub fn inspect<F>(&self, f: F) -> Self
  where
    F: Fn(&Value) + Send + Sync + 'static,
  {
    self.map(move |value| {
      f(&value);
      Ok(value)
    })
  }

  /// Takes the first `count` elements, then completes.
  pub fn take(&self, count: usize) -> Self {
    let source = self.clone();
    Self::new(move || -> ElementStream {
      if count == 0 {
        return Box::pin(stream::empty());
      }
      Box::pin(source.subscribe().take(count))
    })
  }

  /// Skips the first `count` elements.
  pub fn skip(&self, count: usize) -> Self {
    let source = self.clone();
    Self::new(move || Box::pin(source.subscribe().skip(count)))
  }

  /// Drops every element, keeping only termination.
  pub fn ignore_elements(&self) -> Self {
    let source = self.clone();
    Self::new(move || {
      Box::pin(source.subscribe().filter_map(|item| {
        futures::future::ready(match item {
          Ok(_) => None,
          Err(e) => Some(Err(e)),
        })
      }))
    })
  }

  /// Emits the elements of every sequence in turn. Later sequences are
  /// subscribed only after the previous one completes.
  pub fn concat(sequences: Vec<Sequence>) -> Self {
    Self::new(move || -> ElementStream {
      let mut parts = sequences.iter();
      let Some(first) = parts.next() else {
        return Box::pin(stream::empty());
      };
      let first = first.subscribe();
      let rest: Vec<Sequence> = parts.cloned().collect();
      Box::pin(first.chain(stream::iter(rest).flat_map(|sequence| sequence.subscribe())))
    })
  }

  /// Interleaves the elements of every sequence as they arrive. Completes
  /// when all sequences complete.
  pub fn merge(sequences: Vec<Sequence>) -> Self {
    Self::new(move || {
      let streams: SelectAll<ElementStream> =
        stream::select_all(sequences.iter().map(Sequence::subscribe));
      Box::pin(streams)
    })
  }

  /// Switches to `fallback` when this sequence fails.
  pub fn catch(&self, fallback: Sequence) -> Self {
    let source = self.clone();
    Self::new(move || {
      let mut first = source.subscribe();
      let fallback = fallback.clone();
      Box::pin(async_stream::stream! {
        let mut failed = false;
        while let Some(item) = first.next().await {
          match item {
            Ok(value) => yield Ok(value),
            Err(_) => {
              failed = true;
              break;
            }
          }
        }
        if failed {
          drop(first);
          let mut second = fallback.subscribe();
          while let Some(item) = second.next().await {
            yield item;
          }
        }
      })
    })
  }

  /// Continues with `next` when this sequence fails or completes.
  pub fn on_error_resume_next(&self, next: Sequence) -> Self {
    let source = self.clone();
    Self::new(move || {
      let mut first = source.subscribe();
      let next = next.clone();
      Box::pin(async_stream::stream! {
        while let Some(Ok(value)) = first.next().await {
          yield Ok(value);
        }
        drop(first);
        let mut second = next.subscribe();
        while let Some(item) = second.next().await {
          yield item;
        }
      })
    })
  }

  /// Re-subscribes after a failure. With `max_attempts`, the error of the
  /// last allowed attempt is propagated.
  pub fn retry(&self, max_attempts: Option<usize>) -> Self {
    let source = self.clone();
    Self::new(move || {
      let source = source.clone();
      let mut current = source.subscribe();
      Box::pin(async_stream::stream! {
        let mut attempts = 1usize;
        loop {
          match current.next().await {
            Some(Ok(value)) => yield Ok(value),
            Some(Err(error)) => {
              if max_attempts.is_some_and(|max| attempts >= max) {
                yield Err(error);
                break;
              }
              attempts += 1;
              tracing::trace!(attempts, "retrying sequence after error");
              current = source.subscribe();
            }
            None => break,
          }
        }
      })
    })
  }

  /// Passes `output` through unchanged while keeping `connections` running
  /// alongside it. Connection elements are discarded, their errors are
  /// forwarded, and they are dropped as soon as `output` completes.
  pub fn merge_output(output: Sequence, connections: Vec<Sequence>) -> Self {
    if connections.is_empty() {
      return output;
    }
    Self::new(move || {
      let connections = stream::select_all(connections.iter().map(Sequence::subscribe));
      Box::pin(MergeOutput {
        output: output.subscribe(),
        connections: Some(connections),
      })
    })
  }

  /// Runs every connection to completion without emitting elements.
  pub fn merge_connections(connections: Vec<Sequence>) -> Self {
    Sequence::merge(connections).ignore_elements()
  }

  /// Collects every element, stopping at the first error.
  pub async fn collect(&self) -> Result<Vec<Value>, StreamError> {
    let mut stream = self.subscribe();
    let mut values = Vec::new();
    while let Some(item) = stream.next().await {
      values.push(item?);
    }
    Ok(values)
  }
}

/// Ends a stream right after its first error.
#[pin_project]
pub struct StopOnError<S> {
  #[pin]
  inner: S,
  done: bool,
}

impl<S> StopOnError<S> {
  /// Wraps a stream.
  pub fn new(inner: S) -> Self {
    Self { inner, done: false }
  }
}

impl<S> Stream for StopOnError<S>
where
  S: Stream<Item = Result<Value, StreamError>>,
{
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.project();
    if *this.done {
      return Poll::Ready(None);
    }
    match this.inner.poll_next(cx) {
      Poll::Ready(Some(Err(error))) => {
        *this.done = true;
        Poll::Ready(Some(Err(error)))
      }
      Poll::Ready(None) => {
        *this.done = true;
        Poll::Ready(None)
      }
      other => other,
    }
  }
}

/// Connection elements discarded per poll before the output is polled.
const CONNECTION_BUDGET: usize = 32;

struct MergeOutput {
  output: ElementStream,
  connections: Option<SelectAll<ElementStream>>,
}

impl Stream for MergeOutput {
  type Item = Result<Value, StreamError>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let mut budget = CONNECTION_BUDGET;
    while let Some(connections) = self.connections.as_mut() {
      if budget == 0 {
        // give the output a turn; the connections resume on the next poll
        cx.waker().wake_by_ref();
        break;
      }
      match connections.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(_))) => budget -= 1,
        Poll::Ready(Some(Err(error))) => return Poll::Ready(Some(Err(error))),
        Poll::Ready(None) => self.connections = None,
        Poll::Pending => break,
      }
    }
    match self.output.poll_next_unpin(cx) {
      Poll::Ready(None) => {
        self.connections = None;
        Poll::Ready(None)
      }
      other => other,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Int32).collect()
  }

  #[tokio::test]
  async fn test_busy_connection_does_not_starve_output() {
    let busy = Sequence::from_stream(|| stream::repeat(Ok(Value::Unit)));
    let merged = Sequence::merge_output(Sequence::from_values(ints(&[1, 2])), vec![busy]);
    assert_eq!(merged.collect().await.unwrap(), ints(&[1, 2]));
  }

  #[tokio::test]
  async fn test_connection_error_is_forwarded() {
    let failing = Sequence::fail(StreamError::message("branch failed"));
    let merged = Sequence::merge_output(Sequence::never(), vec![failing]);
    let error = merged.collect().await.unwrap_err();
    assert_eq!(error.message_text(), "branch failed");
  }
}
