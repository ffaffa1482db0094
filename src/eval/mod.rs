//! Flag evaluation: the core state machine plus bucketing, clause and
//! segment matching.

mod bucketing;
mod clauses;
mod evaluator;
mod segments;

pub use evaluator::{Evaluator, PrerequisiteEvent, PrerequisiteEventRecorder};
