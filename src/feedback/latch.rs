//! Latched single-slot cells shared between a feedback sub-graph and the
//! combinator that samples it.

use crate::sequence::lock;
use std::sync::Mutex;

/// Holds the most recent value written by a feedback signal.
///
/// Writers replace the value; readers observe whatever was written last. Both
/// go through the same lock.
#[derive(Debug, Default)]
pub struct Latch<T> {
  slot: Mutex<Option<T>>,
}

impl<T: Clone> Latch<T> {
  /// An empty latch.
  pub fn new() -> Self {
    Self {
      slot: Mutex::new(None),
    }
  }

  /// A latch holding `value`.
  pub fn with_value(value: T) -> Self {
    Self {
      slot: Mutex::new(Some(value)),
    }
  }

  /// Replaces the latched value.
  pub fn set(&self, value: T) {
    *lock(&self.slot) = Some(value);
  }

  /// Returns the latched value, if any.
  pub fn get(&self) -> Option<T> {
    lock(&self.slot).clone()
  }

  /// Applies `f` to the latched value under the lock.
  pub fn read<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
    f(lock(&self.slot).as_ref())
  }
}
