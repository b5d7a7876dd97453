//! strandmark-core: scoring, block progression, rubric grading and progress.
//!
//! This crate defines the question data model, the per-type evaluators, the
//! question-block state machine and its async runner, the rubric grader for
//! written artifacts, and the progress/badge aggregator that the rest of
//! strandmark builds on.

pub mod artifact;
pub mod batch;
pub mod block;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod progress;
pub mod rubric;
pub mod runner;
pub mod store;
pub mod traits;
