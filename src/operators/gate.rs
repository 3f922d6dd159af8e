//! Gate operators.

use super::{invalid_property, required};
use crate::feedback::{gate, gate_interval, timed_gate};
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::sequence::Sequence;

fn split(inputs: Vec<Sequence>) -> (Sequence, Sequence) {
  let mut inputs = inputs.into_iter();
  let source = inputs.next().unwrap_or_else(Sequence::empty);
  let gate = inputs.next().unwrap_or_else(Sequence::never);
  (source, gate)
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(OverloadSet::new(
    "Gate",
    vec![Overload::new(
      vec![TypePattern::Generic(0), TypePattern::Generic(1)],
      |b| {
        Ok(Stage::new(b.slot(0).clone(), |inputs: Vec<Sequence>| {
          let (source, opening) = split(inputs);
          gate(source, opening)
        }))
      },
    )],
  ));

  registry.register(OverloadSet::new(
    "GateInterval",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let interval = required(b.node, "interval", |p| p.get_duration("interval"))?;
      if interval.is_zero() {
        return Err(invalid_property(b.node, "interval", "interval must be positive"));
      }
      let scheduler = b.ctx.scheduler();
      Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
        let (source, _) = split(inputs);
        gate_interval(source, scheduler.clone(), interval)
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "TimedGate",
    vec![Overload::new(
      vec![TypePattern::Generic(0), TypePattern::Generic(1)],
      |b| {
        let due_time = required(b.node, "due_time", |p| p.get_duration("due_time"))?;
        let scheduler = b.ctx.scheduler();
        Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
          let (source, opening) = split(inputs);
          timed_gate(source, opening, scheduler.clone(), due_time)
        }))
      },
    )],
  ));
}
