//! # Pipelines and Executions
//!
//! A [`Pipeline`] is the compiled, immutable form of a workflow. It can be
//! cloned, stored and subscribed any number of times; every subscription
//! builds fresh run state.
//!
//! Two ways to run one:
//!
//! - [`Pipeline::subscribe`] returns the raw element stream for async
//!   consumers.
//! - [`Pipeline::instantiate`] binds an [`Observer`] and returns an
//!   [`Execution`] handle with `start`, `cancel`, `wait` and `state`.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use streamweave_workflow::{Node, Workflow, compile};
//!
//! let workflow = Workflow::new()
//!   .node(Node::new("range", "Range").with_property("count", 3))
//!   .output("range");
//! let values = compile(&workflow)?.collect().await?;
//! assert_eq!(values.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::error::StreamError;
use crate::sequence::{ElementStream, Sequence};
use crate::types::ElementType;
use crate::value::Value;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A compiled workflow.
#[derive(Clone)]
pub struct Pipeline {
  name: String,
  output_type: ElementType,
  sequence: Sequence,
  config: EngineConfig,
}

impl Pipeline {
  pub(crate) fn new(name: String, output_type: ElementType, sequence: Sequence, config: EngineConfig) -> Self {
    Self {
      name,
      output_type,
      sequence,
      config,
    }
  }

  /// The pipeline name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The declared output element type.
  pub fn output_type(&self) -> &ElementType {
    &self.output_type
  }

  /// The root sequence.
  pub fn sequence(&self) -> &Sequence {
    &self.sequence
  }

  /// Starts a fresh run and returns its element stream. Dropping the stream
  /// tears the run down.
  pub fn subscribe(&self) -> ElementStream {
    self.sequence.subscribe()
  }

  /// Runs the pipeline to completion, collecting its elements.
  pub async fn collect(&self) -> Result<Vec<Value>, StreamError> {
    self.sequence.collect().await
  }

  /// Binds `observer` to a fresh run. Nothing happens until
  /// [`Execution::start`] is called.
  pub fn instantiate<O>(&self, observer: O) -> Execution
  where
    O: Observer + 'static,
  {
    Execution {
      name: self.name.clone(),
      sequence: self.sequence.clone(),
      trace_elements: self.config.trace_elements,
      observer: Arc::new(observer),
      state: Arc::new(AtomicU8::new(ExecutionState::Created as u8)),
      cancellation: CancellationToken::new(),
      handle: Mutex::new(None),
    }
  }
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("name", &self.name)
      .field("output_type", &self.output_type)
      .finish()
  }
}

/// Receives the notifications of an execution. Exactly one of `on_error` and
/// `on_completed` is called, unless the execution is cancelled first.
#[async_trait]
pub trait Observer: Send + Sync {
  /// Called for every element of the output.
  async fn on_next(&self, value: Value);

  /// Called once when the run fails.
  async fn on_error(&self, error: StreamError);

  /// Called once when the run completes.
  async fn on_completed(&self);
}

/// An observer notification, as sent over a channel.
#[derive(Debug, Clone)]
pub enum Notification {
  /// An output element.
  Next(Value),
  /// The run failed.
  Error(StreamError),
  /// The run completed.
  Completed,
}

#[async_trait]
impl Observer for mpsc::UnboundedSender<Notification> {
  async fn on_next(&self, value: Value) {
    let _ = self.send(Notification::Next(value));
  }

  async fn on_error(&self, error: StreamError) {
    let _ = self.send(Notification::Error(error));
  }

  async fn on_completed(&self) {
    let _ = self.send(Notification::Completed);
  }
}

/// Lifecycle of an [`Execution`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
  /// Instantiated, not started.
  Created = 0,
  /// Running.
  Running = 1,
  /// The output completed.
  Completed = 2,
  /// The output failed.
  Failed = 3,
  /// Cancelled before finishing.
  Cancelled = 4,
}

impl ExecutionState {
  fn from_u8(state: u8) -> Self {
    match state {
      1 => Self::Running,
      2 => Self::Completed,
      3 => Self::Failed,
      4 => Self::Cancelled,
      _ => Self::Created,
    }
  }
}

/// How a finished execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
  /// The output completed.
  Completed,
  /// The output failed with this error.
  Failed(StreamError),
  /// The execution was cancelled, or never started.
  Cancelled,
}

/// A single run of a pipeline, bound to an observer.
pub struct Execution {
  name: String,
  sequence: Sequence,
  trace_elements: bool,
  observer: Arc<dyn Observer>,
  /// Execution state, an [`ExecutionState`] discriminant.
  state: Arc<AtomicU8>,
  cancellation: CancellationToken,
  handle: Mutex<Option<JoinHandle<ExecutionOutcome>>>,
}

impl Execution {
  /// The current lifecycle state.
  pub fn state(&self) -> ExecutionState {
    ExecutionState::from_u8(self.state.load(Ordering::Acquire))
  }

  /// Subscribes the pipeline on a tokio task. Calling it again, or after
  /// cancellation, does nothing.
  pub async fn start(&self) {
    let started = self.state.compare_exchange(
      ExecutionState::Created as u8,
      ExecutionState::Running as u8,
      Ordering::AcqRel,
      Ordering::Acquire,
    );
    if started.is_err() {
      return;
    }
    debug!(pipeline = %self.name, "execution started");

    let name = self.name.clone();
    let mut stream = self.sequence.subscribe();
    let observer = Arc::clone(&self.observer);
    let state = Arc::clone(&self.state);
    let cancellation = self.cancellation.clone();
    let trace_elements = self.trace_elements;
    let handle = tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          _ = cancellation.cancelled() => {
            state.store(ExecutionState::Cancelled as u8, Ordering::Release);
            debug!(pipeline = %name, "execution cancelled");
            return ExecutionOutcome::Cancelled;
          }
          item = stream.next() => match item {
            Some(Ok(value)) => {
              if trace_elements {
                trace!(pipeline = %name, element = %value, "element");
              }
              observer.on_next(value).await;
            }
            Some(Err(error)) => {
              warn!(pipeline = %name, error = %error, "execution failed");
              state.store(ExecutionState::Failed as u8, Ordering::Release);
              observer.on_error(error.clone()).await;
              return ExecutionOutcome::Failed(error);
            }
            None => {
              debug!(pipeline = %name, "execution completed");
              state.store(ExecutionState::Completed as u8, Ordering::Release);
              observer.on_completed().await;
              return ExecutionOutcome::Completed;
            }
          }
        }
      }
    });
    *self.handle.lock().await = Some(handle);
  }

  /// Cancels the run, dropping its subscription and all state below it.
  pub fn cancel(&self) {
    let _ = self.state.compare_exchange(
      ExecutionState::Created as u8,
      ExecutionState::Cancelled as u8,
      Ordering::AcqRel,
      Ordering::Acquire,
    );
    self.cancellation.cancel();
  }

  /// Waits for the run to finish. Only the first call after `start` sees a
  /// failure; later calls report the final state.
  pub async fn wait(&self) -> ExecutionOutcome {
    let handle = self.handle.lock().await.take();
    match handle {
      Some(handle) => match handle.await {
        Ok(outcome) => outcome,
        Err(error) => {
          warn!(pipeline = %self.name, error = %error, "execution task aborted");
          ExecutionOutcome::Cancelled
        }
      },
      None => match self.state() {
        ExecutionState::Completed => ExecutionOutcome::Completed,
        _ => ExecutionOutcome::Cancelled,
      },
    }
  }
}

impl Drop for Execution {
  fn drop(&mut self) {
    self.cancellation.cancel();
  }
}

impl fmt::Debug for Execution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Execution")
      .field("name", &self.name)
      .field("state", &self.state())
      .finish()
  }
}
