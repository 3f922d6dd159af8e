//! Accumulation snapshots passed to `Scan` accumulator sub-graphs.

use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// An immutable snapshot pairing the current accumulated value with the
/// element that is about to be folded into it.
///
/// Equality and ordering are structural: accumulations are compared first,
/// then values.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementAccumulation {
  /// The value accumulated so far.
  pub accumulation: Value,
  /// The incoming element.
  pub value: Value,
}

impl ElementAccumulation {
  /// Creates a new snapshot.
  pub fn new(accumulation: Value, value: Value) -> Self {
    Self {
      accumulation,
      value,
    }
  }
}

impl PartialOrd for ElementAccumulation {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    match self.accumulation.partial_cmp(&other.accumulation)? {
      Ordering::Equal => self.value.partial_cmp(&other.value),
      ordering => Some(ordering),
    }
  }
}

impl fmt::Display for ElementAccumulation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(A:{}, V:{})", self.accumulation, self.value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_format() {
    let snapshot = ElementAccumulation::new(Value::Int32(3), Value::Int32(4));
    assert_eq!(snapshot.to_string(), "(A:3, V:4)");
  }

  #[test]
  fn test_ordering_compares_accumulation_first() {
    let a = ElementAccumulation::new(Value::Int32(1), Value::Int32(9));
    let b = ElementAccumulation::new(Value::Int32(2), Value::Int32(0));
    assert!(a < b);

    let c = ElementAccumulation::new(Value::Int32(1), Value::Int32(3));
    assert!(c < a);
    assert_eq!(a, a.clone());
  }
}
