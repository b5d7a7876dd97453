//! Mock grader for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use strandmark_core::traits::{GradeRequest, GradeVerdict, ShortAnswerGrader};

use crate::error::GraderError;

/// A grader for exercising short-answer flows without real API calls.
///
/// Returns a configured verdict per question id, falling back to a default.
/// With no default, unmatched questions fail like an unreachable service.
pub struct MockGrader {
    /// Map of question id → verdict.
    verdicts: HashMap<String, GradeVerdict>,
    default_verdict: Option<GradeVerdict>,
    latency: Duration,
    call_count: AtomicU32,
    last_request: Mutex<Option<GradeRequest>>,
}

impl MockGrader {
    pub fn new(verdicts: HashMap<String, GradeVerdict>) -> Self {
        Self {
            verdicts,
            default_verdict: None,
            latency: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that gives every answer the same verdict.
    pub fn with_fixed_verdict(score: u8, feedback: &str) -> Self {
        Self {
            default_verdict: Some(GradeVerdict {
                score,
                feedback: feedback.to_string(),
            }),
            ..Self::new(HashMap::new())
        }
    }

    /// A mock whose every call fails.
    pub fn failing() -> Self {
        Self::new(HashMap::new())
    }

    /// Delay every verdict by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GradeRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ShortAnswerGrader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.verdicts
            .get(&request.question_id)
            .or(self.default_verdict.as_ref())
            .cloned()
            .ok_or_else(|| GraderError::NetworkError("mock grader has no verdict".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strandmark_core::evaluator::Evaluator;
    use strandmark_core::model::{Answer, GradedBy, Level, Question, QuestionKind};
    use std::sync::Arc;

    fn request(id: &str) -> GradeRequest {
        GradeRequest {
            question_id: id.into(),
            prompt: "Explain".into(),
            answer: "Because".into(),
            level: Level::Six,
            required_keywords: vec![],
            required_concepts: vec![],
        }
    }

    #[tokio::test]
    async fn fixed_verdict() {
        let grader = MockGrader::with_fixed_verdict(5, "ok");
        let verdict = grader.grade(&request("any")).await.unwrap();
        assert_eq!(verdict.score, 5);
        assert_eq!(grader.call_count(), 1);
        assert_eq!(grader.last_request().unwrap().question_id, "any");
    }

    #[tokio::test]
    async fn per_question_verdicts() {
        let mut verdicts = HashMap::new();
        verdicts.insert(
            "q1".to_string(),
            GradeVerdict {
                score: 2,
                feedback: "thin".into(),
            },
        );
        let grader = MockGrader::new(verdicts);
        assert_eq!(grader.grade(&request("q1")).await.unwrap().score, 2);
        assert!(grader.grade(&request("q2")).await.is_err());
        assert_eq!(grader.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_mock_triggers_evaluator_fallback() {
        let grader =
            Arc::new(MockGrader::with_fixed_verdict(6, "").with_latency(Duration::from_secs(30)));
        let evaluator = Evaluator::with_grader(grader.clone(), Duration::from_secs(8));
        let question = Question {
            id: "sa".into(),
            level: Level::Six,
            points: 6,
            prompt: "Explain".into(),
            strand: "energy".into(),
            concept: String::new(),
            keywords: vec![],
            kind: QuestionKind::ShortAnswer {
                min_words: None,
                max_words: None,
                required_keywords: vec!["energy".into()],
                required_concepts: vec![],
            },
        };
        let response = evaluator
            .evaluate(&question, Answer::Text("energy moves around".into()))
            .await;
        assert_eq!(response.graded_by, GradedBy::Fallback);
        assert_eq!(grader.call_count(), 1);
    }
}
