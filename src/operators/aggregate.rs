//! Numeric aggregates over a whole sequence.
//!
//! Each aggregate is a table of typed implementations on the numeric ladder;
//! `UInt8` inputs resolve to the `Int32` implementation by widening.
//!
//! | Kind | `Int32` | `Int64` | `Float32` | `Float64` |
//! |---|---|---|---|---|
//! | `Sum` | `Int32` | `Int64` | `Float32` | `Float64` |
//! | `Average` | `Float64` | `Float64` | `Float32` | `Float64` |
//! | `Max`, `Min` | `Int32` | `Int64` | `Float32` | `Float64` |
//!
//! `Average`, `Max` and `Min` fail on an empty sequence; `Sum` yields zero.

use super::arithmetic::{ArithmeticOp, arithmetic};
use super::{Origin, first};
use crate::error::StreamError;
use crate::operator::Stage;
use crate::registry::OperatorRegistry;
use crate::resolver::{Overload, OverloadSet, TypePattern};
use crate::sequence::Sequence;
use crate::types::ElementType;
use crate::value::Value;
use futures::StreamExt;

const LADDER: [ElementType; 4] = [
  ElementType::Int32,
  ElementType::Int64,
  ElementType::Float32,
  ElementType::Float64,
];

/// Folds `source` into a single value.
fn fold<S, Step, Finish>(source: Sequence, origin: Origin, init: S, step: Step, finish: Finish) -> Sequence
where
  S: Clone + Send + Sync + 'static,
  Step: Fn(S, Value) -> Result<S, String> + Clone + Send + Sync + 'static,
  Finish: Fn(S) -> Result<Value, String> + Clone + Send + Sync + 'static,
{
  Sequence::new(move || {
    let mut input = source.subscribe();
    let origin = origin.clone();
    let mut state = init.clone();
    let step = step.clone();
    let finish = finish.clone();
    Box::pin(async_stream::stream! {
      while let Some(item) = input.next().await {
        match item {
          Ok(value) => match step(state, value) {
            Ok(next) => state = next,
            Err(message) => {
              yield Err::<Value, StreamError>(origin.failure(message));
              return;
            }
          },
          Err(error) => {
            yield Err(error);
            return;
          }
        }
      }
      yield finish(state).map_err(|message| origin.failure(message));
    })
  })
}

fn zero(ty: &ElementType) -> Value {
  match ty {
    ElementType::Int64 => Value::Int64(0),
    ElementType::Float32 => Value::Float32(0.0),
    ElementType::Float64 => Value::Float64(0.0),
    _ => Value::Int32(0),
  }
}

fn table<F>(kind: &str, output: fn(&ElementType) -> ElementType, build: F) -> OverloadSet
where
  F: Fn(Sequence, Origin, &ElementType) -> Sequence + Clone + Send + Sync + 'static,
{
  let overloads = LADDER
    .iter()
    .map(|ty| {
      let ty = ty.clone();
      let build = build.clone();
      Overload::new(vec![TypePattern::exact(ty.clone())], move |b| {
        let origin = Origin::of(b.node);
        let ty = ty.clone();
        let build = build.clone();
        Ok(Stage::new(output(&ty), move |inputs: Vec<Sequence>| {
          build(first(inputs), origin.clone(), &ty)
        }))
      })
    })
    .collect();
  OverloadSet::new(kind, overloads)
}

fn sum(source: Sequence, origin: Origin, ty: &ElementType) -> Sequence {
  fold(
    source,
    origin,
    zero(ty),
    |total, value| arithmetic(ArithmeticOp::Add, &total, &value),
    Ok,
  )
}

fn average(source: Sequence, origin: Origin, ty: &ElementType) -> Sequence {
  let single = *ty == ElementType::Float32;
  fold(
    source,
    origin,
    (0.0f64, 0usize),
    |(total, count), value| {
      let value = value.as_f64().ok_or_else(|| format!("cannot average {}", value))?;
      Ok((total + value, count + 1))
    },
    move |(total, count)| {
      if count == 0 {
        return Err("sequence contains no elements".to_string());
      }
      let mean = total / count as f64;
      Ok(if single {
        Value::Float32(mean as f32)
      } else {
        Value::Float64(mean)
      })
    },
  )
}

fn extreme(source: Sequence, origin: Origin, keep: std::cmp::Ordering) -> Sequence {
  fold(
    source,
    origin,
    None::<Value>,
    move |current, value| {
      Ok(match current {
        Some(current) if value.partial_cmp(&current) != Some(keep) => Some(current),
        _ => Some(value),
      })
    },
    |current| current.ok_or_else(|| "sequence contains no elements".to_string()),
  )
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
  registry.register(table("Sum", ElementType::clone, sum));
  registry.register(table(
    "Average",
    |ty| match ty {
      ElementType::Float32 => ElementType::Float32,
      _ => ElementType::Float64,
    },
    average,
  ));
  registry.register(table("Max", ElementType::clone, |source, origin, _: &ElementType| {
    extreme(source, origin, std::cmp::Ordering::Greater)
  }));
  registry.register(table("Min", ElementType::clone, |source, origin, _: &ElementType| {
    extreme(source, origin, std::cmp::Ordering::Less)
  }));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::workflow::Node;

  fn origin() -> Origin {
    Origin::of(&Node::new("n", "Aggregate"))
  }

  fn ints(values: &[i32]) -> Sequence {
    Sequence::from_values(values.iter().copied().map(Value::Int32).collect())
  }

  #[tokio::test]
  async fn test_sum_and_average() {
    let total = sum(ints(&[1, 2, 3]), origin(), &ElementType::Int32).collect().await.unwrap();
    assert_eq!(total, vec![Value::Int32(6)]);
    let mean = average(ints(&[1, 2]), origin(), &ElementType::Int32).collect().await.unwrap();
    assert_eq!(mean, vec![Value::Float64(1.5)]);
  }

  #[tokio::test]
  async fn test_empty_sum_is_zero_but_empty_max_fails() {
    let total = sum(ints(&[]), origin(), &ElementType::Int64).collect().await.unwrap();
    assert_eq!(total, vec![Value::Int64(0)]);
    let max = extreme(ints(&[]), origin(), std::cmp::Ordering::Greater).collect().await;
    assert!(max.is_err());
  }

  #[tokio::test]
  async fn test_sum_overflow_fails() {
    let result = sum(ints(&[i32::MAX, 1]), origin(), &ElementType::Int32).collect().await;
    assert!(result.unwrap_err().message_text().contains("overflow"));
  }

  #[tokio::test]
  async fn test_min_and_max() {
    let max = extreme(ints(&[3, 9, 2]), origin(), std::cmp::Ordering::Greater).collect().await.unwrap();
    let min = extreme(ints(&[3, 9, 2]), origin(), std::cmp::Ordering::Less).collect().await.unwrap();
    assert_eq!(max, vec![Value::Int32(9)]);
    assert_eq!(min, vec![Value::Int32(2)]);
  }
}
