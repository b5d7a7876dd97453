//! Core trait definitions for the engine's external collaborators.
//!
//! Graders are implemented by `strandmark-graders`; persistence and event
//! sinks by the embedding application (with simple stores in [`crate::store`]
//! and sinks in [`crate::progress`]).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::model::{Level, QuestionResponse};
use crate::store::{ResponseFilter, ResponseRecord};

// ---------------------------------------------------------------------------
// Short-answer grader
// ---------------------------------------------------------------------------

/// An external grader consulted for short-answer questions.
#[async_trait]
pub trait ShortAnswerGrader: Send + Sync {
    /// Human-readable grader name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Grade one learner answer.
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeVerdict>;
}

/// What an external grader is asked to score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub question_id: String,
    pub prompt: String,
    pub answer: String,
    /// Maximum score for this question.
    pub level: Level,
    #[serde(default)]
    pub required_keywords: Vec<String>,
    #[serde(default)]
    pub required_concepts: Vec<String>,
}

/// A grader's judgment of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeVerdict {
    /// Score on the question's scale; clamped by the evaluator.
    pub score: u8,
    #[serde(default)]
    pub feedback: String,
}

/// Default instructions sent to LLM-backed graders.
pub const DEFAULT_GRADER_PROMPT: &str = "You are grading a student's short written answer. Reply ONLY with a JSON object of the form {\"score\": <integer>, \"feedback\": \"<one or two sentences for the student>\"}. The score must be between 0 and the maximum given.";

/// Build the user message for an LLM-backed grader.
pub fn render_grade_prompt(request: &GradeRequest) -> String {
    let mut prompt = format!(
        "Question: {}\nMaximum score: {}\n",
        request.prompt,
        request.level.points()
    );
    if !request.required_keywords.is_empty() {
        prompt.push_str(&format!(
            "Expected terminology: {}\n",
            request.required_keywords.join(", ")
        ));
    }
    if !request.required_concepts.is_empty() {
        prompt.push_str(&format!(
            "Expected concepts: {}\n",
            request.required_concepts.join(", ")
        ));
    }
    prompt.push_str(&format!("\nStudent answer:\n{}", request.answer));
    prompt
}

/// Extract the first JSON object from an LLM reply.
///
/// Handles:
/// - ```json fenced blocks
/// - generic ``` fenced blocks
/// - bare objects embedded in prose
pub fn extract_json_object(response: &str) -> Option<&str> {
    let mut search = response;
    if let Some(start) = response.find("```") {
        let after_fence = &response[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        // Truncated (unclosed) fences keep everything after the opener.
        search = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    let open = search.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in search[open..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&search[open..open + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// The persistence collaborator. Failures never corrupt in-memory state.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn save_response(&self, record: &ResponseRecord) -> Result<(), PersistenceError>;

    /// Latest response per question id among records matching the filter.
    async fn load_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<HashMap<String, QuestionResponse>, PersistenceError>;
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// Receives progress events for the presentation layer.
pub trait ProgressSink: Send + Sync {
    /// A block completed or an artifact was rubric-scored. `level` is `None`
    /// for rubric scores.
    fn on_progress_update(&self, strand: &str, level: Option<Level>, score: u8);

    /// A badge flipped from not-earned to earned.
    fn on_badge_earned(&self, badge: &str);
}

// ---------------------------------------------------------------------------
// Image classification
// ---------------------------------------------------------------------------

/// Classifies an image embedded in a written artifact.
pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image: &crate::artifact::EmbeddedImage) -> ImageClassification;
}

/// What kind of picture an embedded image is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphKind {
    Scatter,
    Line,
    Bar,
    Unrecognized,
}

/// Result of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageClassification {
    pub kind: GraphKind,
    pub has_axis_labels: bool,
    pub has_title: bool,
}
