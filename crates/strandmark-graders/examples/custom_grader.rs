//! Custom grader example: plug your own short-answer grader into the
//! evaluator.
//!
//! ```bash
//! cargo run --example custom_grader
//! ```

use std::time::Duration;

use async_trait::async_trait;
use strandmark_core::evaluator::Evaluator;
use strandmark_core::model::{Answer, Level, Question, QuestionKind};
use strandmark_core::traits::{GradeRequest, GradeVerdict, ShortAnswerGrader};

/// Awards one point per sentence, up to the question level.
struct SentenceGrader;

#[async_trait]
impl ShortAnswerGrader for SentenceGrader {
    fn name(&self) -> &str {
        "sentences"
    }

    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
        let sentences = request
            .answer
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();
        let score = (sentences as u8).min(request.level.points());
        Ok(GradeVerdict {
            score,
            feedback: format!("{sentences} sentence(s)."),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let question = Question {
        id: "e4-short".into(),
        level: Level::Four,
        points: 4,
        prompt: "What happens to the particles in ice when it melts?".into(),
        strand: "energy".into(),
        concept: "changes of state".into(),
        keywords: vec![],
        kind: QuestionKind::ShortAnswer {
            min_words: Some(5),
            max_words: None,
            required_keywords: vec!["energy".into(), "particles".into()],
            required_concepts: vec![],
        },
    };
    let answer = "The particles gain energy. They vibrate more. They slide past each other. \
                  The solid becomes a liquid.";

    let local = Evaluator::local()
        .evaluate(&question, Answer::Text(answer.into()))
        .await;
    let custom = Evaluator::with_grader(std::sync::Arc::new(SentenceGrader), Duration::from_secs(2))
        .evaluate(&question, Answer::Text(answer.into()))
        .await;

    println!("{:<12} {:<6} {:<8} Feedback", "Grader", "Score", "Correct");
    println!("{}", "-".repeat(60));
    for response in [&local, &custom] {
        println!(
            "{:<12} {:<6} {:<8} {}",
            response.graded_by.to_string(),
            response.score,
            response.is_correct,
            response.feedback
        );
    }

    Ok(())
}
