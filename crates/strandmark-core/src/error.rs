//! Error types for the scoring and progression engine.
//!
//! Grader errors live here rather than in `strandmark-graders` so the
//! evaluator can classify failures (and log them) without string matching.

use thiserror::Error;

/// Errors that can occur when consulting an external short-answer grader.
#[derive(Debug, Error)]
pub enum GraderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The grader answered, but not with a usable verdict.
    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),
}

impl GraderError {
    /// Returns `true` if this error is permanent and will recur on every call.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            GraderError::AuthenticationFailed(_) | GraderError::ModelNotFound(_)
        )
    }
}

/// A question definition that does not have the shape its type requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("multiple-choice question has {0} correct options, expected exactly 1")]
    CorrectOptionCount(usize),

    #[error("multiple-choice question has no options")]
    NoOptions,

    #[error("blank {0} has no accepted answers")]
    BlankWithoutAnswers(usize),

    #[error("fill-in-the-blank question has no blanks")]
    NoBlanks,

    #[error("match pairing is not a bijection: {0}")]
    PairingNotBijective(String),

    #[error("min_words {min} exceeds max_words {max}")]
    WordRange { min: usize, max: usize },

    #[error("answer payload `{answer}` does not fit a {question} question")]
    AnswerMismatch {
        question: &'static str,
        answer: &'static str,
    },
}

/// A learner action the block machine refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block is locked until its prerequisite is met")]
    Locked,

    #[error("block is not awaiting an answer")]
    NotActive,

    #[error("question {submitted} was submitted but question {current} is active")]
    WrongQuestion { submitted: usize, current: usize },

    #[error("an evaluation for question {0} is already in flight")]
    EvaluationInFlight(usize),

    #[error("retry not allowed: {0}")]
    RetryNotAllowed(&'static str),

    #[error("block is not showing feedback")]
    NoPendingFeedback,

    #[error("block has no questions")]
    Empty,
}

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the progress store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("unknown strand: {0}")]
    UnknownStrand(String),
}
