//! # StreamWeave Workflow
//!
//! A typed dataflow workflow engine. Workflows are graphs of operator nodes
//! whose edges carry asynchronous element sequences; the [`GraphCompiler`]
//! resolves every node against the types flowing into it and composes the
//! graph into a [`Pipeline`] that can be subscribed any number of times.
//!
//! ## Key Features
//!
//! - **Overload resolution**: operators declare typed overload tables with
//!   generic and numeric slots; numeric inputs widen along
//!   `UInt8 → Int32 → Int64 → Float32 → Float64`
//! - **Nested workflows**: sub-graphs are compiled against their bound input
//!   types and inlined, or used as selectors by higher-order operators
//! - **Sharing**: `Publish` and `Replay` multicast one upstream subscription to
//!   every consumer of a sub-graph
//! - **Feedback**: `Condition`, `TakeWhile`, `SkipWhile`, `Scan`, `RepeatWhile`
//!   and the `Gate` family drive decisions from sub-graph outputs
//! - **Side effects**: `Sink` and `Visualizer` run sub-graphs alongside a
//!   pass-through output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use streamweave_workflow::{Node, Workflow, compile};
//!
//! let workflow = Workflow::new()
//!   .node(Node::new("source", "Range").with_property("count", 4))
//!   .node(Node::new("sum", "Sum"))
//!   .edge("source", "sum", 0)
//!   .output("sum");
//!
//! let pipeline = compile(&workflow)?;
//! let values = pipeline.collect().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Accumulation snapshots fed to `Scan` accumulators.
pub mod accumulation;
/// Graph compilation into pipelines.
pub mod compiler;
/// Engine configuration.
pub mod config;
/// Compile-time and run-time error types.
pub mod error;
/// Feedback combinators driven by predicate and accumulator sub-graphs.
pub mod feedback;
/// Member path accessors.
pub mod member_path;
/// Multicast hubs and subjects.
pub mod multicast;
/// Operator descriptors and compiled stages.
pub mod operator;
/// The built-in operator catalog.
pub mod operators;
/// Compiled pipelines and their executions.
pub mod pipeline;
/// Node property bags.
pub mod properties;
/// Operator registry.
pub mod registry;
/// Overload resolution.
pub mod resolver;
/// Time sources for time-based operators.
pub mod scheduler;
/// Cold element sequences.
pub mod sequence;
/// Side-effect merge behind `Sink` and `Visualizer`.
pub mod side_effect;
/// Element types and the numeric widening ladder.
pub mod types;
/// Runtime element values.
pub mod value;
/// Workflow graph model.
pub mod workflow;

#[cfg(test)]
mod compiler_test;
#[cfg(test)]
mod feedback_test;
#[cfg(test)]
mod side_effect_test;

pub use compiler::{CompiledWorkflow, GraphCompiler, compile};
pub use config::EngineConfig;
pub use error::{CompileError, ConfigError, Origin, StreamError};
pub use pipeline::{Execution, ExecutionOutcome, ExecutionState, Notification, Observer, Pipeline};
pub use registry::OperatorRegistry;
pub use sequence::Sequence;
pub use types::ElementType;
pub use value::Value;
pub use workflow::{ArgumentRange, Edge, Node, NodeId, Workflow};
