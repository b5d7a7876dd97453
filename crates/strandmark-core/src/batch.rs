//! Concurrent bulk scoring of independent submissions.
//!
//! Used for marking a whole answers file at once, outside any block. Each
//! submission is scored exactly as a block would score it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::evaluator::Evaluator;
use crate::model::{Answer, GradedBy, Question, QuestionResponse};

/// One answer to score.
#[derive(Debug, Clone)]
pub struct Submission {
    pub question: Question,
    pub answer: Answer,
    pub time_spent_ms: Option<u64>,
}

/// Per-question-type totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTotals {
    pub count: usize,
    pub correct: usize,
    pub score: u32,
    pub max_score: u32,
}

/// Scored submissions in input order, plus totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub responses: Vec<QuestionResponse>,
    pub total_score: u32,
    pub max_score: u32,
    pub correct: usize,
    /// Short answers scored locally because the external grader failed.
    pub fallbacks: usize,
    /// Keyed by question type name.
    pub by_type: BTreeMap<String, TypeTotals>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn accuracy(&self) -> f64 {
        if self.responses.is_empty() {
            0.0
        } else {
            self.correct as f64 / self.responses.len() as f64
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse report JSON")
    }
}

/// Score `submissions` with at most `parallelism` evaluations in flight.
pub async fn evaluate_batch(
    evaluator: &Evaluator,
    submissions: Vec<Submission>,
    parallelism: usize,
) -> Result<BatchReport> {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let total = submissions.len();

    let mut futures = FuturesUnordered::new();
    for (index, submission) in submissions.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        futures.push(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
            let max = u32::from(submission.question.level.points());
            let mut response = evaluator
                .evaluate(&submission.question, submission.answer)
                .await;
            if let Some(ms) = submission.time_spent_ms {
                response = response.with_time_spent(ms);
            }
            anyhow::Ok((index, max, response))
        });
    }

    let mut slots: Vec<Option<(u32, QuestionResponse)>> = vec![None; total];
    while let Some(result) = futures.next().await {
        let (index, max, response) = result?;
        tracing::debug!(
            question = %response.question_id,
            score = response.score,
            "scored submission"
        );
        slots[index] = Some((max, response));
    }

    let mut report = BatchReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        responses: Vec::with_capacity(total),
        total_score: 0,
        max_score: 0,
        correct: 0,
        fallbacks: 0,
        by_type: BTreeMap::new(),
        duration_ms: 0,
    };
    for (max, response) in slots.into_iter().flatten() {
        let score = u32::from(response.score);
        report.total_score += score;
        report.max_score += max;
        if response.is_correct {
            report.correct += 1;
        }
        if response.graded_by == GradedBy::Fallback {
            report.fallbacks += 1;
        }
        let totals = report
            .by_type
            .entry(response.question_type.to_string())
            .or_default();
        totals.count += 1;
        totals.score += score;
        totals.max_score += max;
        if response.is_correct {
            totals.correct += 1;
        }
        report.responses.push(response);
    }
    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}
