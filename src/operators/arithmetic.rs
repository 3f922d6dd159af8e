//! Arithmetic and comparison operators.
//!
//! Every operator accepts three shapes:
//!
//! - a pair `Tuple<N0, N1>` of numbers;
//! - an accumulation `ElementAccumulation<N0, N1>` of numbers;
//! - a single number, combined with the node's `value` operand.
//!
//! Both operands are widened to the narrower ladder type that holds both, and
//! the operator body runs on that type. Integer arithmetic is checked.
//! `Equal` and `NotEqual` additionally compare pairs of booleans or strings.

use super::{Origin, first, invalid_property, required};
use crate::error::CompileError;
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Binding, Overload, OverloadSet, TypePattern};
use crate::sequence::Sequence;
use crate::types::{ElementType, common_numeric};
use crate::value::Value;
use std::cmp::Ordering;

/// The arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
  /// `a + b`
  Add,
  /// `a - b`
  Subtract,
  /// `a * b`
  Multiply,
  /// `a / b`
  Divide,
}

/// The comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
  /// `a == b`
  Equal,
  /// `a != b`
  NotEqual,
  /// `a > b`
  GreaterThan,
  /// `a >= b`
  GreaterThanOrEqual,
  /// `a < b`
  LessThan,
  /// `a <= b`
  LessThanOrEqual,
}

macro_rules! checked_integer {
  ($op:expr, $a:expr, $b:expr) => {
    match $op {
      ArithmeticOp::Add => $a.checked_add($b),
      ArithmeticOp::Subtract => $a.checked_sub($b),
      ArithmeticOp::Multiply => $a.checked_mul($b),
      ArithmeticOp::Divide => $a.checked_div($b),
    }
  };
}

macro_rules! float {
  ($op:expr, $a:expr, $b:expr) => {
    match $op {
      ArithmeticOp::Add => $a + $b,
      ArithmeticOp::Subtract => $a - $b,
      ArithmeticOp::Multiply => $a * $b,
      ArithmeticOp::Divide => $a / $b,
    }
  };
}

/// Applies `op` to two values of the same numeric type.
pub fn arithmetic(op: ArithmeticOp, a: &Value, b: &Value) -> Result<Value, String> {
  let result = match (a, b) {
    (Value::UInt8(x), Value::UInt8(y)) => checked_integer!(op, *x, *y).map(Value::UInt8),
    (Value::Int32(x), Value::Int32(y)) => checked_integer!(op, *x, *y).map(Value::Int32),
    (Value::Int64(x), Value::Int64(y)) => checked_integer!(op, *x, *y).map(Value::Int64),
    (Value::Float32(x), Value::Float32(y)) => Some(Value::Float32(float!(op, x, y))),
    (Value::Float64(x), Value::Float64(y)) => Some(Value::Float64(float!(op, x, y))),
    _ => return Err(format!("cannot apply {:?} to {} and {}", op, a, b)),
  };
  result.ok_or_else(|| match op {
    ArithmeticOp::Divide if b.as_i64() == Some(0) => "attempted to divide by zero".to_string(),
    _ => format!("arithmetic overflow in {:?} of {} and {}", op, a, b),
  })
}

/// Compares two values of the same type.
pub fn compare(op: ComparisonOp, a: &Value, b: &Value) -> bool {
  let ordering = a.partial_cmp(b);
  match op {
    ComparisonOp::Equal => a == b,
    ComparisonOp::NotEqual => a != b,
    ComparisonOp::GreaterThan => ordering == Some(Ordering::Greater),
    ComparisonOp::GreaterThanOrEqual => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    ComparisonOp::LessThan => ordering == Some(Ordering::Less),
    ComparisonOp::LessThanOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
  }
}

/// How a node's element supplies the two operands.
#[derive(Debug, Clone)]
enum Operands {
  Pair,
  WithOperand(Value),
}

impl Operands {
  fn split(&self, value: &Value) -> Option<(Value, Value)> {
    match self {
      Operands::Pair => value.pair().map(|(a, b)| (a.clone(), b.clone())),
      Operands::WithOperand(operand) => Some((value.clone(), operand.clone())),
    }
  }
}

/// The common operand type of a binding, and how operands are split.
fn operands(b: &Binding<'_>) -> Result<(ElementType, Operands), CompileError> {
  let input = b.param(0);
  if let Some((left, right)) = input.pair() {
    let common = common_numeric(left, right).unwrap_or_else(|| left.clone());
    return Ok((common, Operands::Pair));
  }
  let literal = required(b.node, "value", |p| Ok(p.get("value")))?;
  let operand = Value::from_json(literal, input).ok_or_else(|| {
    invalid_property(b.node, "value", format!("{} is not a valid {}", literal, input))
  })?;
  Ok((input.clone(), Operands::WithOperand(operand)))
}

fn numeric_shapes() -> Vec<TypePattern> {
  vec![
    TypePattern::pair(TypePattern::Numeric(0), TypePattern::Numeric(1)),
    TypePattern::accumulation(TypePattern::Numeric(0), TypePattern::Numeric(1)),
    TypePattern::Numeric(0),
  ]
}

fn arithmetic_set(kind: &str, op: ArithmeticOp) -> OverloadSet {
  let overloads = numeric_shapes()
    .into_iter()
    .map(|shape| {
      Overload::new(vec![shape], move |b| {
        let (common, operands) = operands(b)?;
        let origin = Origin::of(b.node);
        Ok(Stage::new(common.clone(), move |inputs: Vec<Sequence>| {
          let common = common.clone();
          let operands = operands.clone();
          let origin = origin.clone();
          first(inputs).map(move |value| {
            let (left, right) = operands.split(&value).ok_or_else(|| origin.unexpected(&value))?;
            let (left, right) = widen_both(&left, &right, &common).ok_or_else(|| origin.unexpected(&value))?;
            arithmetic(op, &left, &right).map_err(|message| origin.failure(message).with_item(value.clone()))
          })
        }))
      })
    })
    .collect();
  OverloadSet::new(kind, overloads)
}

fn comparison_set(kind: &str, op: ComparisonOp) -> OverloadSet {
  let mut shapes = numeric_shapes();
  if matches!(op, ComparisonOp::Equal | ComparisonOp::NotEqual) {
    for ty in [ElementType::Bool, ElementType::String] {
      shapes.push(TypePattern::pair(TypePattern::exact(ty.clone()), TypePattern::exact(ty.clone())));
      shapes.push(TypePattern::exact(ty));
    }
  }
  let overloads = shapes
    .into_iter()
    .map(|shape| {
      Overload::new(vec![shape], move |b| {
        let (common, operands) = operands(b)?;
        let origin = Origin::of(b.node);
        Ok(Stage::new(ElementType::Bool, move |inputs: Vec<Sequence>| {
          let common = common.clone();
          let operands = operands.clone();
          let origin = origin.clone();
          first(inputs).map(move |value| {
            let (left, right) = operands.split(&value).ok_or_else(|| origin.unexpected(&value))?;
            let (left, right) = widen_both(&left, &right, &common).ok_or_else(|| origin.unexpected(&value))?;
            Ok(Value::Bool(compare(op, &left, &right)))
          })
        }))
      })
    })
    .collect();
  OverloadSet::new(kind, overloads)
}

fn widen_both(left: &Value, right: &Value, common: &ElementType) -> Option<(Value, Value)> {
  Some((left.widen_to(common)?, right.widen_to(common)?))
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  for (kind, op) in [
    ("Add", ArithmeticOp::Add),
    ("Subtract", ArithmeticOp::Subtract),
    ("Multiply", ArithmeticOp::Multiply),
    ("Divide", ArithmeticOp::Divide),
  ] {
    registry.register(arithmetic_set(kind, op));
  }
  for (kind, op) in [
    ("Equal", ComparisonOp::Equal),
    ("NotEqual", ComparisonOp::NotEqual),
    ("GreaterThan", ComparisonOp::GreaterThan),
    ("GreaterThanOrEqual", ComparisonOp::GreaterThanOrEqual),
    ("LessThan", ComparisonOp::LessThan),
    ("LessThanOrEqual", ComparisonOp::LessThanOrEqual),
  ] {
    registry.register(comparison_set(kind, op));
  }
}
