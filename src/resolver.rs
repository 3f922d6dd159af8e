//! # Type Resolver
//!
//! Picks the overload of a leaf operator that applies to a node's concrete
//! input types, binds its generic slots and returns the built [`Stage`].
//!
//! Resolution follows the usual better-conversion rules:
//!
//! 1. Candidates are filtered by arity and shape. A variadic overload repeats
//!    its last parameter to cover every remaining input. Generic slots bind
//!    to the argument type and must bind identically everywhere they appear.
//! 2. `Exact` parameters accept implicit numeric widening, member-wise inside
//!    tuples, lists and accumulations.
//! 3. A candidate is better than another when none of its parameter types is
//!    a worse fit for its argument and at least one is a better fit. Identity
//!    beats widening; between two widenings the narrower target wins.
//! 4. Remaining ties prefer non-generic overloads, then non-expanded ones.
//!
//! The chosen overload's widening conversions are inserted on its input
//! sequences, so operator bodies only ever see their declared types.

use crate::error::{CompileError, StreamError};
use crate::operator::{OperatorDescriptor, ResolveContext, Stage};
use crate::sequence::Sequence;
use crate::types::{Conversion, ElementType};
use crate::workflow::{ArgumentRange, Node};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A parameter type, possibly mentioning generic slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
  /// A concrete type. Arguments may widen to it.
  Exact(ElementType),
  /// Any type, bound to the numbered slot.
  Generic(usize),
  /// Any numeric ladder type, bound to the numbered slot.
  Numeric(usize),
  /// A tuple of patterns.
  Tuple(Vec<TypePattern>),
  /// An accumulation snapshot.
  Accumulation(Box<TypePattern>, Box<TypePattern>),
  /// A list.
  List(Box<TypePattern>),
  /// A sequence-valued element.
  Sequence(Box<TypePattern>),
}

impl TypePattern {
  /// Shorthand for `Exact`.
  pub fn exact(ty: ElementType) -> Self {
    TypePattern::Exact(ty)
  }

  /// Shorthand for a two-member tuple.
  pub fn pair(first: TypePattern, second: TypePattern) -> Self {
    TypePattern::Tuple(vec![first, second])
  }

  /// Shorthand for an accumulation.
  pub fn accumulation(accumulation: TypePattern, value: TypePattern) -> Self {
    TypePattern::Accumulation(Box::new(accumulation), Box::new(value))
  }

  /// Shorthand for a list.
  pub fn list(item: TypePattern) -> Self {
    TypePattern::List(Box::new(item))
  }

  /// Shorthand for a sequence-valued element.
  pub fn sequence(item: TypePattern) -> Self {
    TypePattern::Sequence(Box::new(item))
  }

  /// Returns true when the pattern mentions a generic slot.
  pub fn is_generic(&self) -> bool {
    match self {
      TypePattern::Exact(_) => false,
      TypePattern::Generic(_) | TypePattern::Numeric(_) => true,
      TypePattern::Tuple(items) => items.iter().any(TypePattern::is_generic),
      TypePattern::Accumulation(acc, value) => acc.is_generic() || value.is_generic(),
      TypePattern::List(item) | TypePattern::Sequence(item) => item.is_generic(),
    }
  }

  fn bind(&self, argument: &ElementType, slots: &mut Vec<Option<ElementType>>) -> Option<Conversion> {
    match (self, argument) {
      (TypePattern::Exact(ty), _) => argument.conversion_to(ty),
      (TypePattern::Numeric(_), _) if !argument.is_numeric() => None,
      (TypePattern::Generic(slot), _) | (TypePattern::Numeric(slot), _) => {
        if slots.len() <= *slot {
          slots.resize(*slot + 1, None);
        }
        match &slots[*slot] {
          Some(bound) if bound != argument => None,
          Some(_) => Some(Conversion::Identity),
          None => {
            slots[*slot] = Some(argument.clone());
            Some(Conversion::Identity)
          }
        }
      }
      (TypePattern::Tuple(patterns), ElementType::Tuple(items)) if patterns.len() == items.len() => {
        patterns
          .iter()
          .zip(items)
          .try_fold(Conversion::Identity, |acc, (pattern, item)| {
            pattern.bind(item, slots).map(|conversion| acc.max(conversion))
          })
      }
      (TypePattern::Accumulation(acc, value), ElementType::Accumulation(acc_type, value_type)) => {
        let acc = acc.bind(acc_type, slots)?;
        let value = value.bind(value_type, slots)?;
        Some(acc.max(value))
      }
      (TypePattern::List(item), ElementType::List(item_type)) => item.bind(item_type, slots),
      (TypePattern::Sequence(item), ElementType::Sequence(item_type)) => {
        // Sequences never widen; a window of UInt8 is not a window of Int32.
        match item.bind(item_type, slots)? {
          Conversion::Identity => Some(Conversion::Identity),
          Conversion::Widening => None,
        }
      }
      _ => None,
    }
  }

  fn instantiate(&self, slots: &[ElementType]) -> ElementType {
    match self {
      TypePattern::Exact(ty) => ty.clone(),
      TypePattern::Generic(slot) | TypePattern::Numeric(slot) => {
        slots.get(*slot).cloned().unwrap_or(ElementType::Unit)
      }
      TypePattern::Tuple(items) => ElementType::Tuple(items.iter().map(|item| item.instantiate(slots)).collect()),
      TypePattern::Accumulation(acc, value) => {
        ElementType::accumulation(acc.instantiate(slots), value.instantiate(slots))
      }
      TypePattern::List(item) => ElementType::list(item.instantiate(slots)),
      TypePattern::Sequence(item) => ElementType::sequence(item.instantiate(slots)),
    }
  }
}

impl fmt::Display for TypePattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypePattern::Exact(ty) => write!(f, "{}", ty),
      TypePattern::Generic(slot) => write!(f, "T{}", slot),
      TypePattern::Numeric(slot) => write!(f, "N{}", slot),
      TypePattern::Tuple(items) => {
        let items: Vec<String> = items.iter().map(ToString::to_string).collect();
        write!(f, "Tuple<{}>", items.join(", "))
      }
      TypePattern::Accumulation(acc, value) => write!(f, "ElementAccumulation<{}, {}>", acc, value),
      TypePattern::List(item) => write!(f, "List<{}>", item),
      TypePattern::Sequence(item) => write!(f, "Sequence<{}>", item),
    }
  }
}

/// Everything an overload's build function gets to see.
pub struct Binding<'a> {
  /// Compile services.
  pub ctx: &'a dyn ResolveContext,
  /// The node being resolved.
  pub node: &'a Node,
  /// Parameter types after slot substitution, one per argument.
  pub params: Vec<ElementType>,
  slots: Vec<ElementType>,
}

impl Binding<'_> {
  /// The type bound to a generic slot.
  pub fn slot(&self, slot: usize) -> &ElementType {
    self.slots.get(slot).unwrap_or(&ElementType::Unit)
  }

  /// The instantiated type of parameter `index`.
  pub fn param(&self, index: usize) -> &ElementType {
    self.params.get(index).unwrap_or(&ElementType::Unit)
  }
}

/// Builds the stage for a chosen overload.
pub type BuildFn = Arc<dyn Fn(&Binding<'_>) -> Result<Stage, CompileError> + Send + Sync>;

/// One typed implementation of an operator kind.
#[derive(Clone)]
pub struct Overload {
  params: Vec<TypePattern>,
  variadic: bool,
  build: BuildFn,
}

impl Overload {
  /// An overload taking exactly `params`.
  pub fn new<F>(params: Vec<TypePattern>, build: F) -> Self
  where
    F: Fn(&Binding<'_>) -> Result<Stage, CompileError> + Send + Sync + 'static,
  {
    Self {
      params,
      variadic: false,
      build: Arc::new(build),
    }
  }

  /// An overload whose last parameter repeats to cover any number (at least
  /// one) of trailing inputs.
  pub fn variadic<F>(params: Vec<TypePattern>, build: F) -> Self
  where
    F: Fn(&Binding<'_>) -> Result<Stage, CompileError> + Send + Sync + 'static,
  {
    Self {
      params,
      variadic: true,
      build: Arc::new(build),
    }
  }

  /// The declared parameters.
  pub fn params(&self) -> &[TypePattern] {
    &self.params
  }

  /// Returns true when the overload has a generic slot anywhere.
  pub fn is_generic(&self) -> bool {
    self.params.iter().any(TypePattern::is_generic)
  }

  /// The arguments this overload accepts.
  pub fn argument_range(&self) -> ArgumentRange {
    if self.variadic {
      ArgumentRange::at_least(self.params.len().max(1))
    } else {
      ArgumentRange::exactly(self.params.len())
    }
  }

  fn expand(&self, count: usize) -> Option<Vec<&TypePattern>> {
    if self.variadic {
      let (last, fixed) = self.params.split_last()?;
      if count < self.params.len() {
        return None;
      }
      let mut expanded: Vec<&TypePattern> = fixed.iter().collect();
      expanded.extend(std::iter::repeat_n(last, count - fixed.len()));
      Some(expanded)
    } else if count == self.params.len() {
      Some(self.params.iter().collect())
    } else {
      None
    }
  }

  fn signature(&self, kind: &str) -> String {
    let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
    let ellipsis = if self.variadic { "..." } else { "" };
    format!("{}({}{})", kind, params.join(", "), ellipsis)
  }
}

impl fmt::Debug for Overload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Overload")
      .field("params", &self.params)
      .field("variadic", &self.variadic)
      .finish_non_exhaustive()
  }
}

struct Candidate<'o> {
  overload: &'o Overload,
  params: Vec<ElementType>,
  conversions: Vec<Conversion>,
  slots: Vec<ElementType>,
}

impl Candidate<'_> {
  fn compare(&self, other: &Candidate<'_>, arguments: &[ElementType]) -> Ordering {
    let mut better = false;
    let mut worse = false;
    for ((argument, mine), theirs) in arguments.iter().zip(&self.params).zip(&other.params) {
      match better_conversion(argument, mine, theirs) {
        Ordering::Greater => better = true,
        Ordering::Less => worse = true,
        Ordering::Equal => {}
      }
    }
    match (better, worse) {
      (true, false) => Ordering::Greater,
      (false, true) => Ordering::Less,
      (true, true) => Ordering::Equal,
      (false, false) => {
        let generic = other.overload.is_generic().cmp(&self.overload.is_generic());
        generic.then_with(|| other.overload.variadic.cmp(&self.overload.variadic))
      }
    }
  }
}

/// Compares how well `first` and `second` fit `argument`.
fn better_conversion(argument: &ElementType, first: &ElementType, second: &ElementType) -> Ordering {
  if first == second {
    return Ordering::Equal;
  }
  if first == argument {
    return Ordering::Greater;
  }
  if second == argument {
    return Ordering::Less;
  }
  match (first.converts_to(second), second.converts_to(first)) {
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    _ => Ordering::Equal,
  }
}

/// Resolves `overloads` of `kind` for `node` against `inputs`.
pub fn resolve_overloads(
  ctx: &dyn ResolveContext,
  node: &Node,
  kind: &str,
  overloads: &[Overload],
  inputs: &[ElementType],
) -> Result<Stage, CompileError> {
  let candidates: Vec<Candidate<'_>> = overloads
    .iter()
    .filter_map(|overload| {
      let params = overload.expand(inputs.len())?;
      let mut slots = Vec::new();
      let conversions = params
        .iter()
        .zip(inputs)
        .map(|(pattern, input)| pattern.bind(input, &mut slots))
        .collect::<Option<Vec<_>>>()?;
      let slots: Vec<ElementType> = slots.into_iter().map(|slot| slot.unwrap_or(ElementType::Unit)).collect();
      let params = params.iter().map(|pattern| pattern.instantiate(&slots)).collect();
      Some(Candidate {
        overload,
        params,
        conversions,
        slots,
      })
    })
    .collect();

  let best = candidates.iter().enumerate().find(|(i, candidate)| {
    candidates
      .iter()
      .enumerate()
      .all(|(j, other)| *i == j || candidate.compare(other, inputs) == Ordering::Greater)
  });

  let chosen = match best {
    Some((_, chosen)) => chosen,
    None if candidates.is_empty() => {
      return Err(CompileError::NoMatchingOverload {
        node: node.id.clone(),
        kind: kind.to_string(),
        inputs: inputs.to_vec(),
      });
    }
    None => {
      let tied = candidates
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
          !candidates
            .iter()
            .enumerate()
            .any(|(j, other)| *i != j && other.compare(candidate, inputs) == Ordering::Greater)
        })
        .map(|(_, candidate)| candidate.overload.signature(kind))
        .collect();
      return Err(CompileError::AmbiguousOverload {
        node: node.id.clone(),
        kind: kind.to_string(),
        candidates: tied,
      });
    }
  };

  trace!(
    node = %node.id,
    overload = %chosen.overload.signature(kind),
    candidates = candidates.len(),
    "resolved overload"
  );

  let binding = Binding {
    ctx,
    node,
    params: chosen.params.clone(),
    slots: chosen.slots.clone(),
  };
  let stage = (chosen.overload.build)(&binding)?;
  Ok(with_widening(stage, &chosen.params, &chosen.conversions))
}

/// Wraps `stage` so inputs that need widening are converted first.
fn with_widening(stage: Stage, params: &[ElementType], conversions: &[Conversion]) -> Stage {
  let targets: Vec<Option<ElementType>> = params
    .iter()
    .zip(conversions)
    .map(|(param, conversion)| (*conversion == Conversion::Widening).then(|| param.clone()))
    .collect();
  if targets.iter().all(Option::is_none) {
    return stage;
  }

  let operator = stage.operator.clone();
  Stage::new(stage.output, move |inputs: Vec<Sequence>| {
    let inputs = inputs
      .into_iter()
      .zip(targets.iter().cloned().chain(std::iter::repeat(None)))
      .map(|(input, target)| match target {
        Some(target) => input.map(move |value| {
          value.widen_to(&target).ok_or_else(|| {
            StreamError::operator(
              "Convert",
              "widening",
              format!("cannot convert {} to {}", value, target),
            )
          })
        }),
        None => input,
      })
      .collect();
    operator.apply(inputs)
  })
}

/// A leaf operator kind described by its overloads.
pub struct OverloadSet {
  kind: String,
  range: ArgumentRange,
  overloads: Vec<Overload>,
}

impl OverloadSet {
  /// An overload set whose argument range covers all of `overloads`.
  pub fn new(kind: impl Into<String>, overloads: Vec<Overload>) -> Self {
    let lower = overloads
      .iter()
      .map(|overload| overload.argument_range().lower)
      .min()
      .unwrap_or(0);
    let upper = overloads
      .iter()
      .map(|overload| overload.argument_range().upper)
      .try_fold(0, |acc, upper| upper.map(|upper| acc.max(upper)));
    Self {
      kind: kind.into(),
      range: ArgumentRange { lower, upper },
      overloads,
    }
  }

  /// The overloads, in declaration order.
  pub fn overloads(&self) -> &[Overload] {
    &self.overloads
  }
}

impl OperatorDescriptor for OverloadSet {
  fn kind(&self) -> &str {
    &self.kind
  }

  fn argument_range(&self, _node: &Node) -> ArgumentRange {
    self.range
  }

  fn resolve(
    &self,
    ctx: &dyn ResolveContext,
    node: &Node,
    inputs: &[ElementType],
  ) -> Result<Stage, CompileError> {
    resolve_overloads(ctx, node, &self.kind, &self.overloads, inputs)
  }
}
