//! Source operators: nodes without inputs.

use super::{invalid_property, optional, required};
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet};
use crate::scheduler::timer;
use crate::sequence::Sequence;
use crate::types::ElementType;
use crate::value::Value;
use serde_json::Value as Json;
use std::time::Duration;

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(OverloadSet::new(
    "Range",
    vec![Overload::new(vec![], |b| {
      let node = b.node;
      let start = optional(node, |p| p.get_i64("start"))?.unwrap_or(0);
      let count = required(node, "count", |p| p.get_usize("count"))?;
      let start = i32::try_from(start).map_err(|_| invalid_property(node, "start", "start must fit in Int32"))?;
      let last = i64::from(start) + i64::try_from(count).unwrap_or(i64::MAX) - 1;
      if count > 0 && i32::try_from(last).is_err() {
        return Err(invalid_property(node, "count", "range exceeds Int32"));
      }
      let values = (0..count)
        .map(|offset| Value::Int32(start + offset as i32))
        .collect::<Vec<_>>();
      Ok(Stage::new(ElementType::Int32, move |_: Vec<Sequence>| {
        Sequence::from_values(values.clone())
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "Values",
    vec![Overload::new(vec![], |b| {
      let node = b.node;
      let items = match required(node, "values", |p| Ok(p.get("values")))? {
        Json::Array(items) => items,
        other => {
          return Err(invalid_property(
            node,
            "values",
            format!("expected an array, found {}", other),
          ));
        }
      };
      let element_type = match optional(node, |p| p.get_as::<ElementType>("element_type"))? {
        Some(ty) => ty,
        None => items
          .first()
          .and_then(Value::infer_json_type)
          .ok_or_else(|| invalid_property(node, "element_type", "cannot infer the type of an empty list"))?,
      };
      let values = items
        .iter()
        .map(|item| {
          Value::from_json(item, &element_type).ok_or_else(|| {
            invalid_property(node, "values", format!("{} is not a valid {}", item, element_type))
          })
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(Stage::new(element_type, move |_: Vec<Sequence>| {
        Sequence::from_values(values.clone())
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "Timer",
    vec![Overload::new(vec![], |b| {
      let node = b.node;
      let due_time = optional(node, |p| p.get_duration("due_time"))?.unwrap_or(Duration::ZERO);
      let period = optional(node, |p| p.get_duration("period"))?;
      if period.is_some_and(|period| period.is_zero()) {
        return Err(invalid_property(node, "period", "period must be positive"));
      }
      let scheduler = b.ctx.scheduler();
      Ok(Stage::new(ElementType::Int64, move |_: Vec<Sequence>| {
        timer(scheduler.clone(), due_time, period)
      }))
    })],
  ));
}
