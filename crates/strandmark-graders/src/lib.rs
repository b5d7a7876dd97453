//! strandmark-graders: external short-answer graders.
//!
//! Implements the `ShortAnswerGrader` trait for Anthropic and Ollama, plus a
//! mock grader, and loads the strandmark configuration that selects them.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod verdict;

pub use config::{
    build_evaluator, create_grader, load_config, load_config_from, GraderConfig, StrandmarkConfig,
};
pub use error::GraderError;
