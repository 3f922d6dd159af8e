//! # Runtime Values
//!
//! [`Value`] is the dynamically tagged element that flows through a compiled
//! pipeline. The compiler guarantees that every value on an edge matches the
//! edge's [`ElementType`], so operator bodies can pattern match on the
//! expected variant and treat anything else as an internal type error.

use crate::accumulation::ElementAccumulation;
use crate::sequence::Sequence;
use crate::types::ElementType;
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single element.
#[derive(Debug, Clone)]
pub enum Value {
  /// The unit value.
  Unit,
  /// A boolean.
  Bool(bool),
  /// An unsigned byte.
  UInt8(u8),
  /// A 32-bit integer.
  Int32(i32),
  /// A 64-bit integer.
  Int64(i64),
  /// A single precision float.
  Float32(f32),
  /// A double precision float.
  Float64(f64),
  /// A string.
  String(String),
  /// A tuple.
  Tuple(Vec<Value>),
  /// A list.
  List(Vec<Value>),
  /// An accumulation snapshot.
  Accumulation(Box<ElementAccumulation>),
  /// A named record, fields in declaration order.
  Record(Vec<(String, Value)>),
  /// A nested sequence.
  Sequence(Sequence),
}

impl Value {
  /// Returns the element type of this value.
  ///
  /// Nested sequences and empty lists do not carry their element type at
  /// runtime; they report `Unit` as item type.
  pub fn element_type(&self) -> ElementType {
    match self {
      Value::Unit => ElementType::Unit,
      Value::Bool(_) => ElementType::Bool,
      Value::UInt8(_) => ElementType::UInt8,
      Value::Int32(_) => ElementType::Int32,
      Value::Int64(_) => ElementType::Int64,
      Value::Float32(_) => ElementType::Float32,
      Value::Float64(_) => ElementType::Float64,
      Value::String(_) => ElementType::String,
      Value::Tuple(items) => ElementType::Tuple(items.iter().map(Value::element_type).collect()),
      Value::List(items) => ElementType::list(
        items
          .first()
          .map(Value::element_type)
          .unwrap_or(ElementType::Unit),
      ),
      Value::Accumulation(snapshot) => ElementType::accumulation(
        snapshot.accumulation.element_type(),
        snapshot.value.element_type(),
      ),
      Value::Record(fields) => ElementType::Record(
        fields
          .iter()
          .map(|(name, value)| (name.clone(), value.element_type()))
          .collect(),
      ),
      Value::Sequence(_) => ElementType::sequence(ElementType::Unit),
    }
  }

  /// Builds an accumulation value.
  pub fn accumulation(accumulation: Value, value: Value) -> Self {
    Value::Accumulation(Box::new(ElementAccumulation::new(accumulation, value)))
  }

  /// Returns the boolean payload.
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// Returns any numeric payload as `f64`.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::UInt8(v) => v.to_f64(),
      Value::Int32(v) => v.to_f64(),
      Value::Int64(v) => v.to_f64(),
      Value::Float32(v) => v.to_f64(),
      Value::Float64(v) => Some(*v),
      _ => None,
    }
  }

  /// Returns any integral payload as `i64`.
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::UInt8(v) => v.to_i64(),
      Value::Int32(v) => v.to_i64(),
      Value::Int64(v) => Some(*v),
      _ => None,
    }
  }

  /// Returns the first and second members of a pair shaped value.
  pub fn pair(&self) -> Option<(&Value, &Value)> {
    match self {
      Value::Tuple(items) if items.len() == 2 => Some((&items[0], &items[1])),
      Value::Accumulation(snapshot) => Some((&snapshot.accumulation, &snapshot.value)),
      _ => None,
    }
  }

  /// Applies the implicit numeric conversion to `target`.
  ///
  /// Returns `None` when the value cannot be represented as `target`.
  pub fn convert_to(&self, target: &ElementType) -> Option<Value> {
    if self.as_f64().is_none() {
      return (!target.is_numeric()).then(|| self.clone());
    }
    match target {
      ElementType::UInt8 => self.as_i64().and_then(|v| v.to_u8()).map(Value::UInt8),
      ElementType::Int32 => self.as_i64().and_then(|v| v.to_i32()).map(Value::Int32),
      ElementType::Int64 => self.as_i64().map(Value::Int64),
      ElementType::Float32 => self.as_f64().and_then(|v| v.to_f32()).map(Value::Float32),
      ElementType::Float64 => self.as_f64().map(Value::Float64),
      _ => None,
    }
  }

  /// Applies an implicit conversion to `target`, recursing through tuples,
  /// lists and accumulations.
  pub fn widen_to(&self, target: &ElementType) -> Option<Value> {
    match (self, target) {
      (Value::Tuple(items), ElementType::Tuple(types)) if items.len() == types.len() => items
        .iter()
        .zip(types)
        .map(|(item, ty)| item.widen_to(ty))
        .collect::<Option<Vec<_>>>()
        .map(Value::Tuple),
      (Value::List(items), ElementType::List(item_type)) => items
        .iter()
        .map(|item| item.widen_to(item_type))
        .collect::<Option<Vec<_>>>()
        .map(Value::List),
      (Value::Accumulation(snapshot), ElementType::Accumulation(acc, value)) => Some(
        Value::accumulation(
          snapshot.accumulation.widen_to(acc)?,
          snapshot.value.widen_to(value)?,
        ),
      ),
      _ => self.convert_to(target),
    }
  }

  /// Converts a JSON literal to a value of the requested type.
  pub fn from_json(json: &serde_json::Value, ty: &ElementType) -> Option<Value> {
    use serde_json::Value as Json;
    match (ty, json) {
      (ElementType::Unit, Json::Null) => Some(Value::Unit),
      (ElementType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
      (ElementType::UInt8, Json::Number(n)) => n.as_u64().and_then(|v| v.to_u8()).map(Value::UInt8),
      (ElementType::Int32, Json::Number(n)) => n.as_i64().and_then(|v| v.to_i32()).map(Value::Int32),
      (ElementType::Int64, Json::Number(n)) => n.as_i64().map(Value::Int64),
      (ElementType::Float32, Json::Number(n)) => {
        n.as_f64().and_then(|v| v.to_f32()).map(Value::Float32)
      }
      (ElementType::Float64, Json::Number(n)) => n.as_f64().map(Value::Float64),
      (ElementType::String, Json::String(s)) => Some(Value::String(s.clone())),
      (ElementType::Tuple(types), Json::Array(items)) if types.len() == items.len() => types
        .iter()
        .zip(items)
        .map(|(ty, item)| Value::from_json(item, ty))
        .collect::<Option<Vec<_>>>()
        .map(Value::Tuple),
      (ElementType::List(item_type), Json::Array(items)) => items
        .iter()
        .map(|item| Value::from_json(item, item_type))
        .collect::<Option<Vec<_>>>()
        .map(Value::List),
      (ElementType::Record(fields), Json::Object(map)) => fields
        .iter()
        .map(|(name, ty)| {
          map
            .get(name)
            .and_then(|item| Value::from_json(item, ty))
            .map(|value| (name.clone(), value))
        })
        .collect::<Option<Vec<_>>>()
        .map(Value::Record),
      _ => None,
    }
  }

  /// Infers the element type of a JSON literal.
  ///
  /// Integers map to `Int32` when they fit, `Int64` otherwise; other numbers
  /// map to `Float64`. Arrays become tuples and objects become records.
  pub fn infer_json_type(json: &serde_json::Value) -> Option<ElementType> {
    use serde_json::Value as Json;
    match json {
      Json::Null => Some(ElementType::Unit),
      Json::Bool(_) => Some(ElementType::Bool),
      Json::Number(n) => match n.as_i64() {
        Some(v) if v.to_i32().is_some() => Some(ElementType::Int32),
        Some(_) => Some(ElementType::Int64),
        None => Some(ElementType::Float64),
      },
      Json::String(_) => Some(ElementType::String),
      Json::Array(items) => items
        .iter()
        .map(Value::infer_json_type)
        .collect::<Option<Vec<_>>>()
        .map(ElementType::Tuple),
      Json::Object(map) => map
        .iter()
        .map(|(name, item)| Value::infer_json_type(item).map(|ty| (name.clone(), ty)))
        .collect::<Option<Vec<_>>>()
        .map(ElementType::Record),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Unit, Value::Unit) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::UInt8(a), Value::UInt8(b)) => a == b,
      (Value::Int32(a), Value::Int32(b)) => a == b,
      (Value::Int64(a), Value::Int64(b)) => a == b,
      (Value::Float32(a), Value::Float32(b)) => a == b,
      (Value::Float64(a), Value::Float64(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a == b,
      (Value::Accumulation(a), Value::Accumulation(b)) => a == b,
      (Value::Record(a), Value::Record(b)) => a == b,
      (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
      _ => false,
    }
  }
}

impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    match (self, other) {
      (Value::Unit, Value::Unit) => Some(Ordering::Equal),
      (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
      (Value::UInt8(a), Value::UInt8(b)) => a.partial_cmp(b),
      (Value::Int32(a), Value::Int32(b)) => a.partial_cmp(b),
      (Value::Int64(a), Value::Int64(b)) => a.partial_cmp(b),
      (Value::Float32(a), Value::Float32(b)) => a.partial_cmp(b),
      (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
      (Value::String(a), Value::String(b)) => a.partial_cmp(b),
      (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a.partial_cmp(b),
      (Value::Accumulation(a), Value::Accumulation(b)) => a.partial_cmp(b),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Unit => write!(f, "()"),
      Value::Bool(v) => write!(f, "{}", v),
      Value::UInt8(v) => write!(f, "{}", v),
      Value::Int32(v) => write!(f, "{}", v),
      Value::Int64(v) => write!(f, "{}", v),
      Value::Float32(v) => write!(f, "{}", v),
      Value::Float64(v) => write!(f, "{}", v),
      Value::String(v) => write!(f, "{}", v),
      Value::Tuple(items) => {
        write!(f, "(")?;
        write_values(f, items)?;
        write!(f, ")")
      }
      Value::List(items) => {
        write!(f, "[")?;
        write_values(f, items)?;
        write!(f, "]")
      }
      Value::Accumulation(snapshot) => write!(f, "{}", snapshot),
      Value::Record(fields) => {
        write!(f, "{{ ")?;
        for (i, (name, value)) in fields.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{} = {}", name, value)?;
        }
        write!(f, " }}")
      }
      Value::Sequence(_) => write!(f, "<sequence>"),
    }
  }
}

fn write_values(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      write!(f, ", ")?;
    }
    write!(f, "{}", item)?;
  }
  Ok(())
}

macro_rules! impl_from {
  ($($ty:ty => $variant:ident),* $(,)?) => {
    $(
      impl From<$ty> for Value {
        fn from(v: $ty) -> Self {
          Value::$variant(v)
        }
      }
    )*
  };
}

impl_from!(
  bool => Bool,
  u8 => UInt8,
  i32 => Int32,
  i64 => Int64,
  f32 => Float32,
  f64 => Float64,
  String => String,
);

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::String(v.to_string())
  }
}

impl From<()> for Value {
  fn from(_: ()) -> Self {
    Value::Unit
  }
}

/// A hashable view of a value, used by keyed operators such as `DistinctBy`.
///
/// Floats hash and compare by bit pattern.
#[derive(Debug, Clone)]
pub struct HashKey(pub Value);

impl PartialEq for HashKey {
  fn eq(&self, other: &Self) -> bool {
    key_eq(&self.0, &other.0)
  }
}

impl Eq for HashKey {}

impl Hash for HashKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    hash_value(&self.0, state);
  }
}

fn key_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
    (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
    (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => {
      a.len() == b.len() && a.iter().zip(b).all(|(a, b)| key_eq(a, b))
    }
    (Value::Accumulation(a), Value::Accumulation(b)) => {
      key_eq(&a.accumulation, &b.accumulation) && key_eq(&a.value, &b.value)
    }
    (Value::Record(a), Value::Record(b)) => {
      a.len() == b.len()
        && a
          .iter()
          .zip(b)
          .all(|((na, va), (nb, vb))| na == nb && key_eq(va, vb))
    }
    _ => a == b,
  }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
  std::mem::discriminant(value).hash(state);
  match value {
    Value::Unit => {}
    Value::Bool(v) => v.hash(state),
    Value::UInt8(v) => v.hash(state),
    Value::Int32(v) => v.hash(state),
    Value::Int64(v) => v.hash(state),
    Value::Float32(v) => v.to_bits().hash(state),
    Value::Float64(v) => v.to_bits().hash(state),
    Value::String(v) => v.hash(state),
    Value::Tuple(items) | Value::List(items) => {
      items.len().hash(state);
      for item in items {
        hash_value(item, state);
      }
    }
    Value::Accumulation(snapshot) => {
      hash_value(&snapshot.accumulation, state);
      hash_value(&snapshot.value, state);
    }
    Value::Record(fields) => {
      for (name, item) in fields {
        name.hash(state);
        hash_value(item, state);
      }
    }
    Value::Sequence(sequence) => sequence.identity().hash(state),
  }
}
