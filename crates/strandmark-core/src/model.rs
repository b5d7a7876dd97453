//! Core data model types for strandmark.
//!
//! Questions are statically loaded and immutable; a [`QuestionResponse`] is
//! created once per submission and never mutated afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// A difficulty tier within a strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    Two,
    Four,
    Six,
    Eight,
}

impl Level {
    /// The highest score any response or strand can reach.
    pub const MAX_POINTS: u8 = 8;

    /// Numeric value of the level, which is also the maximum score of a
    /// question at this level.
    pub fn points(self) -> u8 {
        match self {
            Level::Two => 2,
            Level::Four => 4,
            Level::Six => 6,
            Level::Eight => 8,
        }
    }

    /// The next level up, if any.
    pub fn next(self) -> Option<Level> {
        match self {
            Level::Two => Some(Level::Four),
            Level::Four => Some(Level::Six),
            Level::Six => Some(Level::Eight),
            Level::Eight => None,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Level::Two),
            4 => Ok(Level::Four),
            6 => Ok(Level::Six),
            8 => Ok(Level::Eight),
            other => Err(format!("invalid level {other}, expected 2, 4, 6 or 8")),
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.points()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.points())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid level: {s}"))?;
        Level::try_from(value)
    }
}

/// The four supported question modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    FillBlank,
    MatchClick,
    ShortAnswer,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Mcq => write!(f, "multiple-choice"),
            QuestionType::FillBlank => write!(f, "fill-in-the-blank"),
            QuestionType::MatchClick => write!(f, "match"),
            QuestionType::ShortAnswer => write!(f, "short-answer"),
        }
    }
}

/// A single question in a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within the dataset.
    pub id: String,
    /// Difficulty tier; also the maximum score.
    pub level: Level,
    /// Display weight carried through from the dataset.
    #[serde(default)]
    pub points: u32,
    /// The prompt shown to the learner.
    pub prompt: String,
    /// Topic/strand this question belongs to.
    #[serde(default)]
    pub strand: String,
    /// Concept tag, surfaced as a hint after repeated misses.
    #[serde(default)]
    pub concept: String,
    /// Keywords, surfaced alongside the concept tag.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Type-specific shape.
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// Type-specific question shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq {
        options: Vec<McqOption>,
    },
    FillBlank {
        template: String,
        blanks: Vec<Blank>,
    },
    MatchClick {
        left: Vec<String>,
        right: Vec<String>,
        pairs: Vec<MatchPair>,
    },
    ShortAnswer {
        #[serde(default)]
        min_words: Option<usize>,
        #[serde(default)]
        max_words: Option<usize>,
        #[serde(default)]
        required_keywords: Vec<String>,
        #[serde(default)]
        required_concepts: Vec<String>,
    },
}

impl QuestionKind {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::Mcq { .. } => QuestionType::Mcq,
            QuestionKind::FillBlank { .. } => QuestionType::FillBlank,
            QuestionKind::MatchClick { .. } => QuestionType::MatchClick,
            QuestionKind::ShortAnswer { .. } => QuestionType::ShortAnswer,
        }
    }
}

/// One option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    /// Partial credit awarded when this (incorrect) option is chosen.
    #[serde(default)]
    pub level: Option<u8>,
}

/// One blank of a fill-in-the-blank question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blank {
    pub accepted: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub hints: Vec<String>,
}

/// A left/right pairing in a match question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

impl MatchPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }

    /// Check the shape invariants of this question's kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.kind {
            QuestionKind::Mcq { options } => {
                if options.is_empty() {
                    return Err(ValidationError::NoOptions);
                }
                let correct = options.iter().filter(|o| o.is_correct).count();
                if correct != 1 {
                    return Err(ValidationError::CorrectOptionCount(correct));
                }
                Ok(())
            }
            QuestionKind::FillBlank { blanks, .. } => {
                if blanks.is_empty() {
                    return Err(ValidationError::NoBlanks);
                }
                match blanks
                    .iter()
                    .position(|b| b.accepted.iter().all(|a| a.trim().is_empty()))
                {
                    Some(index) => Err(ValidationError::BlankWithoutAnswers(index)),
                    None => Ok(()),
                }
            }
            QuestionKind::MatchClick { left, right, pairs } => {
                validate_pairing(left, right, pairs).map_err(ValidationError::PairingNotBijective)
            }
            QuestionKind::ShortAnswer {
                min_words,
                max_words,
                ..
            } => {
                if let (Some(min), Some(max)) = (*min_words, *max_words) {
                    if min > max {
                        return Err(ValidationError::WordRange { min, max });
                    }
                }
                Ok(())
            }
        }
    }
}

fn validate_pairing(left: &[String], right: &[String], pairs: &[MatchPair]) -> Result<(), String> {
    if pairs.is_empty() {
        return Err("no pairs defined".into());
    }
    let right_items: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen_left = HashSet::new();
    let mut seen_right = HashSet::new();
    for pair in pairs {
        if !left.contains(&pair.left) {
            return Err(format!("unknown left item '{}'", pair.left));
        }
        if !right_items.contains(pair.right.as_str()) {
            return Err(format!("unknown right item '{}'", pair.right));
        }
        if !seen_left.insert(pair.left.as_str()) {
            return Err(format!("left item '{}' paired twice", pair.left));
        }
        if !seen_right.insert(pair.right.as_str()) {
            return Err(format!("right item '{}' paired twice", pair.right));
        }
    }
    if let Some(unpaired) = left.iter().find(|l| !seen_left.contains(l.as_str())) {
        return Err(format!("left item '{unpaired}' has no pair"));
    }
    Ok(())
}

/// The raw answer a learner submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Selected option id.
    Choice(String),
    /// One entry per blank, in order.
    Blanks(Vec<String>),
    /// Submitted pairings, order irrelevant.
    Matches(Vec<MatchPair>),
    /// Free text.
    Text(String),
}

impl Answer {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Answer::Choice(_) => "choice",
            Answer::Blanks(_) => "blanks",
            Answer::Matches(_) => "matches",
            Answer::Text(_) => "text",
        }
    }
}

/// Who produced the score of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "name", rename_all = "snake_case")]
pub enum GradedBy {
    /// Scored by the built-in rules.
    Local,
    /// Scored by the named external grader.
    External(String),
    /// The external grader failed; the local heuristic was used instead.
    Fallback,
}

impl fmt::Display for GradedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradedBy::Local => write!(f, "local"),
            GradedBy::External(name) => write!(f, "{name}"),
            GradedBy::Fallback => write!(f, "local (fallback)"),
        }
    }
}

/// The scored result of one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub question_id: String,
    pub question_type: QuestionType,
    pub answer: Answer,
    pub is_correct: bool,
    /// Always within `0..=level`.
    pub score: u8,
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub time_spent_ms: Option<u64>,
    pub graded_by: GradedBy,
}

impl QuestionResponse {
    /// Build a response, clamping the score to the question's level.
    pub fn new(
        question: &Question,
        answer: Answer,
        score: u8,
        is_correct: bool,
        feedback: impl Into<String>,
        graded_by: GradedBy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id: question.id.clone(),
            question_type: question.question_type(),
            answer,
            is_correct,
            score: score.min(question.level.points()),
            feedback: feedback.into(),
            timestamp: Utc::now(),
            time_spent_ms: None,
            graded_by,
        }
    }

    /// A zero-score response carrying a diagnostic message.
    pub fn rejected(question: &Question, answer: Answer, diagnostic: impl Into<String>) -> Self {
        Self::new(question, answer, 0, false, diagnostic, GradedBy::Local)
    }

    pub fn with_time_spent(mut self, ms: u64) -> Self {
        self.time_spent_ms = Some(ms);
        self
    }
}
