//! # Element Types
//!
//! The closed set of element types that flow along workflow edges, together
//! with the implicit numeric widening ladder used by the resolver.
//!
//! Every edge of a compiled workflow carries exactly one [`ElementType`]. Leaf
//! operators declare their accepted shapes in terms of these types, and the
//! resolver compares candidate overloads by how well each argument type
//! converts to the declared parameter type.
//!
//! ## Numeric ladder
//!
//! ```text
//! UInt8 -> Int32 -> Int64 -> Float32 -> Float64
//! ```
//!
//! A numeric type implicitly widens to every type to its right.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of the elements carried by a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
  /// The unit type, carried by signal sequences.
  Unit,
  /// Boolean elements.
  Bool,
  /// Unsigned 8-bit integers.
  UInt8,
  /// Signed 32-bit integers.
  Int32,
  /// Signed 64-bit integers.
  Int64,
  /// Single precision floats.
  Float32,
  /// Double precision floats.
  Float64,
  /// UTF-8 strings.
  String,
  /// Fixed-arity tuples. Members are addressed as `Item1..ItemN`.
  Tuple(Vec<ElementType>),
  /// Variable length lists of one element type.
  List(Box<ElementType>),
  /// Accumulation snapshots: `(accumulation, value)`.
  Accumulation(Box<ElementType>, Box<ElementType>),
  /// Named records.
  Record(Vec<(String, ElementType)>),
  /// Sequence-valued elements, such as windows.
  Sequence(Box<ElementType>),
}

/// How an argument type converts to a parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Conversion {
  /// The types are identical.
  Identity,
  /// The argument widens implicitly along the numeric ladder.
  Widening,
}

impl ElementType {
  /// Returns the position of this type on the numeric ladder, if numeric.
  pub fn numeric_rank(&self) -> Option<u8> {
    match self {
      ElementType::UInt8 => Some(0),
      ElementType::Int32 => Some(1),
      ElementType::Int64 => Some(2),
      ElementType::Float32 => Some(3),
      ElementType::Float64 => Some(4),
      _ => None,
    }
  }

  /// Returns true for the five ladder types.
  pub fn is_numeric(&self) -> bool {
    self.numeric_rank().is_some()
  }

  /// Returns true when `self` implicitly converts to `target`.
  ///
  /// Identity counts as an implicit conversion.
  pub fn converts_to(&self, target: &ElementType) -> bool {
    self.conversion_to(target).is_some()
  }

  /// Classifies the implicit conversion from `self` to `target`.
  ///
  /// Tuples, lists and accumulations convert member-wise; the conversion
  /// widens when any member widens.
  pub fn conversion_to(&self, target: &ElementType) -> Option<Conversion> {
    if self == target {
      return Some(Conversion::Identity);
    }
    match (self, target) {
      (ElementType::Tuple(from), ElementType::Tuple(to)) if from.len() == to.len() => {
        from.iter().zip(to).try_fold(Conversion::Identity, |acc, (from, to)| {
          from.conversion_to(to).map(|conversion| acc.max(conversion))
        })
      }
      (ElementType::List(from), ElementType::List(to)) => from.conversion_to(to),
      (ElementType::Accumulation(acc, value), ElementType::Accumulation(to_acc, to_value)) => {
        let acc = acc.conversion_to(to_acc)?;
        let value = value.conversion_to(to_value)?;
        Some(acc.max(value))
      }
      _ => match (self.numeric_rank(), target.numeric_rank()) {
        (Some(from), Some(to)) if from < to => Some(Conversion::Widening),
        _ => None,
      },
    }
  }

  /// Convenience constructor for `Tuple`.
  pub fn tuple(items: impl IntoIterator<Item = ElementType>) -> Self {
    ElementType::Tuple(items.into_iter().collect())
  }

  /// Convenience constructor for `List`.
  pub fn list(item: ElementType) -> Self {
    ElementType::List(Box::new(item))
  }

  /// Convenience constructor for `Accumulation`.
  pub fn accumulation(accumulation: ElementType, value: ElementType) -> Self {
    ElementType::Accumulation(Box::new(accumulation), Box::new(value))
  }

  /// Convenience constructor for `Sequence`.
  pub fn sequence(item: ElementType) -> Self {
    ElementType::Sequence(Box::new(item))
  }

  /// Returns the `(first, second)` member types of a pair shaped type.
  ///
  /// Two-element tuples and accumulations are pairs.
  pub fn pair(&self) -> Option<(&ElementType, &ElementType)> {
    match self {
      ElementType::Tuple(items) if items.len() == 2 => Some((&items[0], &items[1])),
      ElementType::Accumulation(acc, value) => Some((acc, value)),
      _ => None,
    }
  }
}

/// Returns the narrowest ladder type both arguments convert to.
pub fn common_numeric(a: &ElementType, b: &ElementType) -> Option<ElementType> {
  let (ra, rb) = (a.numeric_rank()?, b.numeric_rank()?);
  Some(if ra >= rb { a.clone() } else { b.clone() })
}

impl fmt::Display for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ElementType::Unit => write!(f, "Unit"),
      ElementType::Bool => write!(f, "Bool"),
      ElementType::UInt8 => write!(f, "UInt8"),
      ElementType::Int32 => write!(f, "Int32"),
      ElementType::Int64 => write!(f, "Int64"),
      ElementType::Float32 => write!(f, "Float32"),
      ElementType::Float64 => write!(f, "Float64"),
      ElementType::String => write!(f, "String"),
      ElementType::Tuple(items) => {
        write!(f, "Tuple<")?;
        write_list(f, items)?;
        write!(f, ">")
      }
      ElementType::List(item) => write!(f, "List<{}>", item),
      ElementType::Accumulation(acc, value) => {
        write!(f, "ElementAccumulation<{}, {}>", acc, value)
      }
      ElementType::Record(fields) => {
        write!(f, "Record{{")?;
        for (i, (name, ty)) in fields.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}: {}", name, ty)?;
        }
        write!(f, "}}")
      }
      ElementType::Sequence(item) => write!(f, "Sequence<{}>", item),
    }
  }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[ElementType]) -> fmt::Result {
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      write!(f, ", ")?;
    }
    write!(f, "{}", item)?;
  }
  Ok(())
}

/// Formats a slice of types as `(A, B, C)` for diagnostics.
pub fn display_types(types: &[ElementType]) -> String {
  let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
  format!("({})", parts.join(", "))
}
