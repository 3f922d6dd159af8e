//! # Feedback Combinators
//!
//! Combinators whose behavior is steered by a sub-graph that observes the
//! combinator's own data: predicates sampled per element, accumulators that
//! see their previous result, repetition driven by completion signals, and
//! gates opened by control sequences.

pub mod condition;
pub mod gate;
pub mod latch;
pub mod repeat_while;
pub mod scan;

pub use condition::{ConditionAction, condition};
pub use gate::{gate, gate_interval, timed_gate};
pub use latch::Latch;
pub use repeat_while::repeat_while;
pub use scan::{scan, scan_seeded};
