//! Error recovery operators.

use super::{invalid_property, required};
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::sequence::Sequence;

fn pair(inputs: Vec<Sequence>) -> (Sequence, Sequence) {
  let mut inputs = inputs.into_iter();
  let first = inputs.next().unwrap_or_else(Sequence::empty);
  let second = inputs.next().unwrap_or_else(Sequence::empty);
  (first, second)
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(OverloadSet::new(
    "Catch",
    vec![Overload::new(
      vec![TypePattern::Generic(0), TypePattern::Generic(0)],
      |b| {
        Ok(Stage::new(b.slot(0).clone(), |inputs: Vec<Sequence>| {
          let (source, fallback) = pair(inputs);
          source.catch(fallback)
        }))
      },
    )],
  ));

  registry.register(OverloadSet::new(
    "OnErrorResumeNext",
    vec![Overload::new(
      vec![TypePattern::Generic(0), TypePattern::Generic(0)],
      |b| {
        Ok(Stage::new(b.slot(0).clone(), |inputs: Vec<Sequence>| {
          let (source, next) = pair(inputs);
          source.on_error_resume_next(next)
        }))
      },
    )],
  ));

  registry.register(OverloadSet::new(
    "Retry",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      Ok(Stage::new(b.slot(0).clone(), |inputs: Vec<Sequence>| {
        pair(inputs).0.retry(None)
      }))
    })],
  ));

  registry.register(OverloadSet::new(
    "RetryCount",
    vec![Overload::new(vec![TypePattern::Generic(0)], |b| {
      let count = required(b.node, "count", |p| p.get_usize("count"))?;
      if count == 0 {
        return Err(invalid_property(b.node, "count", "count must be positive"));
      }
      Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
        pair(inputs).0.retry(Some(count))
      }))
    })],
  ));
}
