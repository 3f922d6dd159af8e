//! Operators combining several inputs.
//!
//! `Zip` and `CombineLatest` have tuple overloads for two to four inputs of
//! any types and a variadic overload that combines any number of same-typed
//! inputs into a `List`. `Merge` and `Concat` take any number of same-typed
//! inputs, or flatten a single sequence-valued input.

use super::{Origin, first};
use crate::error::StreamError;
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Binding, Overload, OverloadSet, TypePattern};
use crate::sequence::{ElementStream, Sequence};
use crate::types::ElementType;
use crate::value::Value;
use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

type Combine = fn(Vec<Value>) -> Value;

/// Pairs the n-th elements of every input.
pub fn zip(inputs: Vec<Sequence>, combine: Combine) -> Sequence {
  Sequence::new(move || {
    Box::pin(ZipStream {
      queues: inputs.iter().map(|_| VecDeque::new()).collect(),
      inputs: inputs.iter().map(|input| Some(input.subscribe())).collect(),
      combine,
    })
  })
}

struct ZipStream {
  inputs: Vec<Option<ElementStream>>,
  queues: Vec<VecDeque<Value>>,
  combine: Combine,
}

impl Stream for ZipStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.inputs.is_empty() {
      return Poll::Ready(None);
    }
    for (input, queue) in this.inputs.iter_mut().zip(this.queues.iter_mut()) {
      if !queue.is_empty() {
        continue;
      }
      let Some(stream) = input.as_mut() else {
        continue;
      };
      match stream.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(value))) => queue.push_back(value),
        Poll::Ready(Some(Err(error))) => return Poll::Ready(Some(Err(error))),
        Poll::Ready(None) => *input = None,
        Poll::Pending => {}
      }
    }

    if this.queues.iter().all(|queue| !queue.is_empty()) {
      let values = this.queues.iter_mut().filter_map(VecDeque::pop_front).collect();
      return Poll::Ready(Some(Ok((this.combine)(values))));
    }
    let exhausted = this
      .inputs
      .iter()
      .zip(&this.queues)
      .any(|(input, queue)| input.is_none() && queue.is_empty());
    if exhausted {
      this.inputs.clear();
      return Poll::Ready(None);
    }
    Poll::Pending
  }
}

/// Combines the latest element of every input whenever any input emits, once
/// all inputs have emitted.
pub fn combine_latest(inputs: Vec<Sequence>, combine: Combine) -> Sequence {
  Sequence::new(move || {
    Box::pin(CombineLatestStream {
      latest: vec![None; inputs.len()],
      inputs: inputs.iter().map(|input| Some(input.subscribe())).collect(),
      next: 0,
      combine,
    })
  })
}

struct CombineLatestStream {
  inputs: Vec<Option<ElementStream>>,
  latest: Vec<Option<Value>>,
  next: usize,
  combine: Combine,
}

impl Stream for CombineLatestStream {
  type Item = Result<Value, StreamError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    let count = this.inputs.len();
    let mut idle = 0;
    while idle < count {
      let index = this.next;
      this.next = (this.next + 1) % count;
      let Some(stream) = this.inputs[index].as_mut() else {
        idle += 1;
        continue;
      };
      match stream.poll_next_unpin(cx) {
        Poll::Ready(Some(Ok(value))) => {
          idle = 0;
          this.latest[index] = Some(value);
          if this.latest.iter().all(Option::is_some) {
            let values = this.latest.iter().flatten().cloned().collect();
            return Poll::Ready(Some(Ok((this.combine)(values))));
          }
        }
        Poll::Ready(Some(Err(error))) => return Poll::Ready(Some(Err(error))),
        Poll::Ready(None) => {
          this.inputs[index] = None;
          if this.latest[index].is_none() {
            this.inputs.iter_mut().for_each(|input| *input = None);
            return Poll::Ready(None);
          }
          idle += 1;
        }
        Poll::Pending => idle += 1,
      }
    }
    if this.inputs.iter().all(Option::is_none) {
      Poll::Ready(None)
    } else {
      Poll::Pending
    }
  }
}

/// Flattens a sequence of sequences. With `concurrent`, inner sequences are
/// merged as they arrive; otherwise each runs to completion in turn.
pub fn flatten(source: Sequence, origin: Origin, concurrent: bool) -> Sequence {
  Sequence::new(move || -> ElementStream {
    let origin = origin.clone();
    let inner = source.subscribe().map(move |item| -> ElementStream {
      match item {
        Ok(Value::Sequence(inner)) => inner.subscribe(),
        Ok(other) => Box::pin(stream::iter([Err(origin.unexpected(&other))])),
        Err(error) => Box::pin(stream::iter([Err(error)])),
      }
    });
    if concurrent {
      Box::pin(inner.flatten_unordered(None))
    } else {
      Box::pin(inner.flatten())
    }
  })
}

fn tuple(values: Vec<Value>) -> Value {
  Value::Tuple(values)
}

fn list(values: Vec<Value>) -> Value {
  Value::List(values)
}

fn combinator_set(kind: &str, combinator: fn(Vec<Sequence>, Combine) -> Sequence) -> OverloadSet {
  let mut overloads: Vec<Overload> = (2..=4)
    .map(|arity| {
      let params = (0..arity).map(TypePattern::Generic).collect();
      Overload::new(params, move |b: &Binding<'_>| {
        let output = ElementType::Tuple(b.params.clone());
        Ok(Stage::new(output, move |inputs: Vec<Sequence>| combinator(inputs, tuple)))
      })
    })
    .collect();
  overloads.push(Overload::variadic(vec![TypePattern::Generic(0)], move |b| {
    let output = ElementType::list(b.slot(0).clone());
    Ok(Stage::new(output, move |inputs: Vec<Sequence>| combinator(inputs, list)))
  }));
  OverloadSet::new(kind, overloads)
}

fn flatten_set(kind: &str, concurrent: bool) -> OverloadSet {
  OverloadSet::new(
    kind,
    vec![
      Overload::variadic(vec![TypePattern::Generic(0)], move |b| {
        Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
          if concurrent {
            Sequence::merge(inputs)
          } else {
            Sequence::concat(inputs)
          }
        }))
      }),
      Overload::new(
        vec![TypePattern::sequence(TypePattern::Generic(0))],
        move |b| {
          let origin = Origin::of(b.node);
          Ok(Stage::new(b.slot(0).clone(), move |inputs: Vec<Sequence>| {
            flatten(first(inputs), origin.clone(), concurrent)
          }))
        },
      ),
    ],
  )
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(combinator_set("Zip", zip));
  registry.register(combinator_set("CombineLatest", combine_latest));
  registry.register(flatten_set("Merge", true));
  registry.register(flatten_set("Concat", false));
}
