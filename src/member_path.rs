//! # Member Paths
//!
//! A member path such as `Item1.Value` selects a nested member of an element.
//! Paths are parsed once at compile time and bound against the input element
//! type into a [`MemberAccessor`]; the accessor then extracts members at run
//! time without re-parsing.
//!
//! Several comma-separated paths (`Item1,Item2.Count`) select a tuple of
//! members. The empty path selects the element itself.
//!
//! | Element type | Members |
//! |---|---|
//! | `Tuple` | `Item1` .. `ItemN` |
//! | `ElementAccumulation` | `Accumulation`, `Value` |
//! | `Record` | field names |
//! | `List` | `Count` |
//! | `String` | `Length` |

use crate::error::CompileError;
use crate::types::ElementType;
use crate::value::Value;
use crate::workflow::NodeId;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
enum Step {
  TupleItem(usize),
  Accumulation,
  AccumulatedValue,
  RecordField(usize),
  ListCount,
  StringLength,
}

/// A member path bound to a concrete element type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberAccessor {
  selections: Vec<Vec<Step>>,
  output: ElementType,
}

impl MemberAccessor {
  /// Parses `path` and binds it against `input`.
  pub fn bind(node: &NodeId, path: &str, input: &ElementType) -> Result<Self, CompileError> {
    let path = path.trim();
    if path.is_empty() {
      return Ok(Self::identity(input));
    }

    let mut selections = Vec::new();
    let mut outputs = Vec::new();
    for selection in path.split(',') {
      let (steps, output) = bind_selection(node, path, selection.trim(), input)?;
      selections.push(steps);
      outputs.push(output);
    }

    let output = if outputs.len() == 1 {
      outputs.remove(0)
    } else {
      ElementType::Tuple(outputs)
    };
    Ok(Self { selections, output })
  }

  /// The accessor that returns the element itself.
  pub fn identity(input: &ElementType) -> Self {
    Self {
      selections: vec![Vec::new()],
      output: input.clone(),
    }
  }

  /// The type of the selected member(s).
  pub fn output_type(&self) -> &ElementType {
    &self.output
  }

  /// Extracts the selected member(s). Returns `None` when the value does
  /// not have the shape the accessor was bound against.
  pub fn apply(&self, value: &Value) -> Option<Value> {
    if self.selections.len() == 1 {
      return select(&self.selections[0], value);
    }
    self
      .selections
      .iter()
      .map(|steps| select(steps, value))
      .collect::<Option<Vec<_>>>()
      .map(Value::Tuple)
  }
}

fn identifier() -> Option<&'static Regex> {
  static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
  PATTERN
    .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
    .as_ref()
}

fn bind_selection(
  node: &NodeId,
  path: &str,
  selection: &str,
  input: &ElementType,
) -> Result<(Vec<Step>, ElementType), CompileError> {
  let mut steps = Vec::new();
  let mut current = input.clone();
  for segment in selection.split('.') {
    let segment = segment.trim();
    let invalid = |element_type: &ElementType| CompileError::InvalidMemberPath {
      node: node.clone(),
      path: path.to_string(),
      segment: segment.to_string(),
      element_type: element_type.clone(),
    };
    if !identifier().is_some_and(|pattern| pattern.is_match(segment)) {
      return Err(invalid(&current));
    }

    let (step, next) = resolve_member(segment, &current).ok_or_else(|| invalid(&current))?;
    steps.push(step);
    current = next;
  }
  Ok((steps, current))
}

fn resolve_member(segment: &str, ty: &ElementType) -> Option<(Step, ElementType)> {
  match ty {
    ElementType::Tuple(items) => {
      let index: usize = segment.strip_prefix("Item")?.parse().ok()?;
      let item = items.get(index.checked_sub(1)?)?;
      Some((Step::TupleItem(index - 1), item.clone()))
    }
    ElementType::Accumulation(acc, value) => match segment {
      "Accumulation" => Some((Step::Accumulation, (**acc).clone())),
      "Value" => Some((Step::AccumulatedValue, (**value).clone())),
      _ => None,
    },
    ElementType::Record(fields) => fields
      .iter()
      .position(|(name, _)| name == segment)
      .map(|index| (Step::RecordField(index), fields[index].1.clone())),
    ElementType::List(_) if segment == "Count" => Some((Step::ListCount, ElementType::Int32)),
    ElementType::String if segment == "Length" => Some((Step::StringLength, ElementType::Int32)),
    _ => None,
  }
}

fn select(steps: &[Step], value: &Value) -> Option<Value> {
  let mut current = value.clone();
  for step in steps {
    current = match (step, current) {
      (Step::TupleItem(index), Value::Tuple(mut items)) if *index < items.len() => {
        items.swap_remove(*index)
      }
      (Step::Accumulation, Value::Accumulation(snapshot)) => snapshot.accumulation,
      (Step::AccumulatedValue, Value::Accumulation(snapshot)) => snapshot.value,
      (Step::RecordField(index), Value::Record(mut fields)) if *index < fields.len() => {
        fields.swap_remove(*index).1
      }
      (Step::ListCount, Value::List(items)) => Value::Int32(i32::try_from(items.len()).ok()?),
      (Step::StringLength, Value::String(s)) => {
        Value::Int32(i32::try_from(s.chars().count()).ok()?)
      }
      _ => return None,
    };
  }
  Some(current)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node() -> NodeId {
    NodeId::from("selector")
  }

  #[test]
  fn test_empty_path_is_identity() {
    let accessor = MemberAccessor::bind(&node(), "", &ElementType::Int32).unwrap();
    assert_eq!(accessor.output_type(), &ElementType::Int32);
    assert_eq!(accessor.apply(&Value::Int32(7)), Some(Value::Int32(7)));
  }

  #[test]
  fn test_nested_tuple_and_accumulation_members() {
    let ty = ElementType::tuple([
      ElementType::accumulation(ElementType::Int64, ElementType::String),
      ElementType::Bool,
    ]);
    let accessor = MemberAccessor::bind(&node(), "Item1.Value.Length", &ty).unwrap();
    assert_eq!(accessor.output_type(), &ElementType::Int32);

    let value = Value::Tuple(vec![
      Value::accumulation(Value::Int64(1), Value::from("abc")),
      Value::Bool(true),
    ]);
    assert_eq!(accessor.apply(&value), Some(Value::Int32(3)));
  }

  #[test]
  fn test_multiple_selections_build_tuple() {
    let ty = ElementType::tuple([ElementType::Int32, ElementType::Float64]);
    let accessor = MemberAccessor::bind(&node(), "Item2, Item1", &ty).unwrap();
    assert_eq!(
      accessor.output_type(),
      &ElementType::tuple([ElementType::Float64, ElementType::Int32])
    );
    let value = Value::Tuple(vec![Value::Int32(1), Value::Float64(2.5)]);
    assert_eq!(
      accessor.apply(&value),
      Some(Value::Tuple(vec![Value::Float64(2.5), Value::Int32(1)]))
    );
  }

  #[test]
  fn test_unknown_member_names_failing_segment() {
    let ty = ElementType::tuple([ElementType::Int32, ElementType::Int32]);
    let err = MemberAccessor::bind(&node(), "Item1.Missing", &ty).unwrap_err();
    match err {
      CompileError::InvalidMemberPath {
        segment,
        element_type,
        ..
      } => {
        assert_eq!(segment, "Missing");
        assert_eq!(element_type, ElementType::Int32);
      }
      other => panic!("unexpected error {:?}", other),
    }
  }

  #[test]
  fn test_out_of_range_tuple_item() {
    let ty = ElementType::tuple([ElementType::Int32, ElementType::Int32]);
    assert!(MemberAccessor::bind(&node(), "Item3", &ty).is_err());
    assert!(MemberAccessor::bind(&node(), "Item0", &ty).is_err());
    assert!(MemberAccessor::bind(&node(), "Item1..Item2", &ty).is_err());
  }
}
