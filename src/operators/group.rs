//! `GroupBy`: splits a sequence into keyed groups.
//!
//! Every element is routed to the group of its `key` member path, projected
//! through the optional `element` member path. A group is emitted once, when
//! its first element arrives, as a `Record { Key, Elements }` where
//! `Elements` is a sequence of the group's elements. Groups replay their
//! content to late subscribers, like windows do, and complete or fail
//! together with the source.

use super::{Origin, first, optional};
use crate::error::StreamError;
use crate::member_path::MemberAccessor;
use crate::multicast::{ReplayPolicy, Subject};
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::scheduler::Scheduler;
use crate::sequence::Sequence;
use crate::types::ElementType;
use crate::value::{HashKey, Value};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Groups `source` by `key`, projecting grouped elements with `element`.
pub fn group_by(
  source: Sequence,
  key: MemberAccessor,
  element: MemberAccessor,
  scheduler: Arc<dyn Scheduler>,
  origin: Origin,
) -> Sequence {
  Sequence::new(move || {
    let mut upstream = source.subscribe();
    let key = key.clone();
    let element = element.clone();
    let scheduler = scheduler.clone();
    let origin = origin.clone();
    Box::pin(async_stream::stream! {
      let mut groups: HashMap<HashKey, Subject> = HashMap::new();
      while let Some(item) = upstream.next().await {
        let value = match item {
          Ok(value) => value,
          Err(error) => {
            fail_all(&groups, &error);
            yield Err(error);
            return;
          }
        };
        let (Some(group_key), Some(projected)) = (key.apply(&value), element.apply(&value)) else {
          let error = origin.unexpected(&value);
          fail_all(&groups, &error);
          yield Err(error);
          return;
        };

        let slot = HashKey(group_key.clone());
        if !groups.contains_key(&slot) {
          trace!(node = origin.id(), key = %group_key, "opened group");
          let subject = Subject::replay(ReplayPolicy::unbounded(), scheduler.clone());
          let group = Value::Record(vec![
            ("Key".to_string(), group_key),
            ("Elements".to_string(), Value::Sequence(subject.sequence())),
          ]);
          groups.insert(slot.clone(), subject);
          yield Ok(group);
        }
        if let Some(subject) = groups.get(&slot) {
          subject.on_next(projected);
        }
      }
      for subject in groups.values() {
        subject.on_completed();
      }
    })
  })
}

fn fail_all(groups: &HashMap<HashKey, Subject>, error: &StreamError) {
  for subject in groups.values() {
    subject.on_error(error.clone());
  }
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(OverloadSet::new(
    "GroupBy",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let node = b.node;
      let key = MemberAccessor::bind(&node.id, optional(node, |p| p.get_str("key"))?.unwrap_or(""), b.slot(0))?;
      let element = MemberAccessor::bind(
        &node.id,
        optional(node, |p| p.get_str("element"))?.unwrap_or(""),
        b.slot(0),
      )?;
      let output = ElementType::Record(vec![
        ("Key".to_string(), key.output_type().clone()),
        ("Elements".to_string(), ElementType::sequence(element.output_type().clone())),
      ]);
      let scheduler = b.ctx.scheduler();
      let origin = Origin::of(node);
      Ok(Stage::new(output, move |inputs: Vec<Sequence>| {
        group_by(
          first(inputs),
          key.clone(),
          element.clone(),
          scheduler.clone(),
          origin.clone(),
        )
      }))
    })],
  ));
}
