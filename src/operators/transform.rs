//! Element-wise transforms over a single input.

use super::{Origin, first, invalid_property, optional, required};
use crate::member_path::MemberAccessor;
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::sequence::Sequence;
use crate::types::ElementType;
use crate::value::{HashKey, Value};
use futures::StreamExt;
use std::collections::HashSet;

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(OverloadSet::new(
    "Constant",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let node = b.node;
      let literal = required(node, "value", |p| Ok(p.get("value")))?;
      let element_type = match optional(node, |p| p.get_as::<ElementType>("element_type"))? {
        Some(ty) => ty,
        None => Value::infer_json_type(literal)
          .ok_or_else(|| invalid_property(node, "value", "cannot infer the type of the value"))?,
      };
      let value = Value::from_json(literal, &element_type).ok_or_else(|| {
        invalid_property(node, "value", format!("{} is not a valid {}", literal, element_type))
      })?;
      Ok(Stage::new(element_type, move |inputs: Vec<Sequence>| {
        let value = value.clone();
        first(inputs).map(move |_| Ok(value.clone()))
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "MemberSelector",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let node = b.node;
      let path = optional(node, |p| p.get_str("selector"))?.unwrap_or("");
      let accessor = MemberAccessor::bind(&node.id, path, b.slot(0))?;
      let origin = Origin::of(node);
      Ok(Stage::new(accessor.output_type().clone(), move |inputs: Vec<Sequence>| {
        let accessor = accessor.clone();
        let origin = origin.clone();
        first(inputs).map(move |value| accessor.apply(&value).ok_or_else(|| origin.unexpected(&value)))
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "ElementIndex",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let output = ElementType::Record(vec![
        ("Value".to_string(), b.slot(0).clone()),
        ("Index".to_string(), ElementType::Int32),
      ]);
      let origin = Origin::of(b.node);
      Ok(Stage::new(output, move |inputs: Vec<Sequence>| {
        let source = first(inputs);
        let origin = origin.clone();
        Sequence::new(move || {
          let origin = origin.clone();
          Box::pin(source.subscribe().enumerate().map(move |(index, item)| {
            let value = item?;
            let index = i32::try_from(index).map_err(|_| origin.failure("element index exceeds Int32"))?;
            Ok(Value::Record(vec![
              ("Value".to_string(), value),
              ("Index".to_string(), Value::Int32(index)),
            ]))
          }))
        })
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "DistinctBy",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let node = b.node;
      let path = optional(node, |p| p.get_str("key"))?.unwrap_or("");
      let key = MemberAccessor::bind(&node.id, path, b.slot(0))?;
      let origin = Origin::of(node);
      Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
        let source = first(inputs);
        let key = key.clone();
        let origin = origin.clone();
        Sequence::new(move || {
          let key = key.clone();
          let origin = origin.clone();
          let mut seen: HashSet<HashKey> = HashSet::new();
          Box::pin(source.subscribe().filter_map(move |item| {
            let out = match item {
              Ok(value) => match key.apply(&value) {
                Some(k) => seen.insert(HashKey(k)).then_some(Ok(value)),
                None => Some(Err(origin.unexpected(&value))),
              },
              Err(error) => Some(Err(error)),
            };
            futures::future::ready(out)
          }))
        })
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "Take",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let count = required(b.node, "count", |p| p.get_usize("count"))?;
      Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
        first(inputs).take(count)
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "Skip",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let count = required(b.node, "count", |p| p.get_usize("count"))?;
      Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
        first(inputs).skip(count)
      }))
    })],
  ));
}
