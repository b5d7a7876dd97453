//! The question-block state machine.
//!
//! [`QuestionBlock`] is synchronous and owns no timers: every learner action
//! is one method call that either applies a transition or returns a
//! [`BlockError`]. Delays, evaluation and reporting live in
//! [`crate::runner::BlockRunner`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BlockError;
use crate::model::{Level, Question, QuestionKind, QuestionResponse};

/// Tunables for one block run.
#[derive(Debug, Clone)]
pub struct BlockConfig {
    /// Feedback display time after a correct answer.
    pub correct_delay: Duration,
    /// Feedback display time after an incorrect answer.
    pub incorrect_delay: Duration,
    /// Block average needed to unlock the next level.
    pub unlock_threshold: f64,
    /// Incorrect answers allowed before retries are refused.
    pub max_attempts: u32,
    /// Start in [`BlockState::Locked`] until [`QuestionBlock::unlock`].
    pub lock_until_prerequisite: bool,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            correct_delay: Duration::from_millis(1500),
            incorrect_delay: Duration::from_millis(3000),
            unlock_threshold: 6.0,
            max_attempts: 3,
            lock_until_prerequisite: false,
        }
    }
}

impl BlockConfig {
    /// Zero feedback delays, for scripted runs.
    pub fn instant() -> Self {
        Self {
            correct_delay: Duration::ZERO,
            incorrect_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, correct: bool) -> Duration {
        if correct {
            self.correct_delay
        } else {
            self.incorrect_delay
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum BlockState {
    Locked,
    Active(usize),
    Feedback(usize),
    Completed,
}

/// Identifies one in-flight submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    pub index: usize,
    pub question_id: String,
    pub generation: u64,
}

/// Result of handing an evaluated response back to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Response recorded; the block now shows feedback.
    Recorded { correct: bool },
    /// The block moved on while the answer was being evaluated.
    Stale,
}

/// Result of a (possibly delayed) advance out of feedback.
#[derive(Debug, Clone)]
pub enum Advance {
    Next(usize),
    Completed(BlockSummary),
    /// Scheduled for a run or question that is no longer current.
    Stale,
}

/// Unscored guidance shown after repeated misses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub concept: String,
    pub keywords: Vec<String>,
    /// Fill-in-the-blank hints, one list per blank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blank_hints: Vec<Vec<String>>,
}

/// Outcome of a completed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block_id: String,
    pub path: String,
    pub strand: String,
    pub level: Level,
    pub average: f64,
    pub total_score: u32,
    pub max_score: u32,
    pub correct_count: usize,
    pub next_level_unlocked: bool,
    pub responses: Vec<QuestionResponse>,
}

impl BlockSummary {
    /// The score reported to progress tracking: the rounded average.
    pub fn reported_score(&self) -> u8 {
        self.average.round().clamp(0.0, f64::from(Level::MAX_POINTS)) as u8
    }
}

/// A sequence of same-level questions answered in order.
#[derive(Debug, Clone)]
pub struct QuestionBlock {
    id: String,
    path: String,
    strand: String,
    level: Level,
    questions: Vec<Question>,
    state: BlockState,
    responses: Vec<Option<QuestionResponse>>,
    attempts: u32,
    max_attempts: u32,
    unlock_threshold: f64,
    generation: u64,
    in_flight: Option<usize>,
}

impl QuestionBlock {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        strand: impl Into<String>,
        level: Level,
        questions: Vec<Question>,
        config: &BlockConfig,
    ) -> Result<Self, BlockError> {
        if questions.is_empty() {
            return Err(BlockError::Empty);
        }
        let state = if config.lock_until_prerequisite {
            BlockState::Locked
        } else {
            BlockState::Active(0)
        };
        Ok(Self {
            id: id.into(),
            path: path.into(),
            strand: strand.into(),
            level,
            responses: vec![None; questions.len()],
            questions,
            state,
            attempts: 0,
            max_attempts: config.max_attempts,
            unlock_threshold: config.unlock_threshold,
            generation: 0,
            in_flight: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn strand(&self) -> &str {
        &self.strand
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn responses(&self) -> &[Option<QuestionResponse>] {
        &self.responses
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    fn current_index(&self) -> Option<usize> {
        match self.state {
            BlockState::Active(i) | BlockState::Feedback(i) => Some(i),
            BlockState::Locked | BlockState::Completed => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_index().map(|i| &self.questions[i])
    }

    /// Mark question `index` in flight and hand out what the evaluator needs.
    pub fn begin_submission(
        &mut self,
        index: usize,
    ) -> Result<(SubmissionTicket, Question), BlockError> {
        if let Some(busy) = self.in_flight {
            return Err(BlockError::EvaluationInFlight(busy));
        }
        match self.state {
            BlockState::Locked => Err(BlockError::Locked),
            BlockState::Active(current) if current != index => Err(BlockError::WrongQuestion {
                submitted: index,
                current,
            }),
            BlockState::Active(_) => {
                self.in_flight = Some(index);
                let question = self.questions[index].clone();
                let ticket = SubmissionTicket {
                    index,
                    question_id: question.id.clone(),
                    generation: self.generation,
                };
                Ok((ticket, question))
            }
            BlockState::Feedback(_) | BlockState::Completed => Err(BlockError::NotActive),
        }
    }

    fn ticket_is_current(&self, ticket: &SubmissionTicket) -> bool {
        ticket.generation == self.generation
            && self.state == BlockState::Active(ticket.index)
            && self.questions[ticket.index].id == ticket.question_id
    }

    /// Record the evaluated response for `ticket`.
    pub fn complete_submission(
        &mut self,
        ticket: &SubmissionTicket,
        response: QuestionResponse,
    ) -> Completion {
        if !self.ticket_is_current(ticket) {
            return Completion::Stale;
        }
        let correct = response.is_correct;
        if !correct {
            self.attempts += 1;
        }
        self.responses[ticket.index] = Some(response);
        self.in_flight = None;
        self.state = BlockState::Feedback(ticket.index);
        Completion::Recorded { correct }
    }

    /// Release an in-flight marker whose evaluation was dropped.
    pub fn cancel_submission(&mut self, ticket: &SubmissionTicket) {
        if self.ticket_is_current(ticket) && self.in_flight == Some(ticket.index) {
            self.in_flight = None;
        }
    }

    /// Leave feedback for question `index` of run `generation`.
    pub fn advance(&mut self, generation: u64, index: usize) -> Advance {
        if generation != self.generation || self.state != BlockState::Feedback(index) {
            return Advance::Stale;
        }
        if index + 1 < self.questions.len() {
            self.state = BlockState::Active(index + 1);
            return Advance::Next(index + 1);
        }
        self.state = BlockState::Completed;
        match self.summary() {
            Some(summary) => Advance::Completed(summary),
            None => Advance::Stale,
        }
    }

    /// Re-open the question currently showing feedback.
    pub fn retry(&mut self) -> Result<usize, BlockError> {
        let BlockState::Feedback(index) = self.state else {
            return Err(BlockError::NoPendingFeedback);
        };
        let correct = self.responses[index]
            .as_ref()
            .is_some_and(|r| r.is_correct);
        if correct {
            return Err(BlockError::RetryNotAllowed("the answer was already correct"));
        }
        if self.attempts >= self.max_attempts {
            return Err(BlockError::RetryNotAllowed("no attempts remaining"));
        }
        self.generation += 1;
        self.state = BlockState::Active(index);
        Ok(index)
    }

    /// Start the block over. A locked block stays locked.
    pub fn reset(&mut self) {
        self.responses = vec![None; self.questions.len()];
        self.attempts = 0;
        self.in_flight = None;
        self.generation += 1;
        if self.state != BlockState::Locked {
            self.state = BlockState::Active(0);
        }
    }

    /// Open a locked block. Returns whether the state changed.
    pub fn unlock(&mut self) -> bool {
        if self.state == BlockState::Locked {
            self.state = BlockState::Active(0);
            true
        } else {
            false
        }
    }

    pub fn hint(&self) -> Option<Hint> {
        if self.attempts < 2 {
            return None;
        }
        let question = self.current_question()?;
        let blank_hints = match &question.kind {
            QuestionKind::FillBlank { blanks, .. } => {
                blanks.iter().map(|b| b.hints.clone()).collect()
            }
            _ => Vec::new(),
        };
        Some(Hint {
            concept: question.concept.clone(),
            keywords: question.keywords.clone(),
            blank_hints,
        })
    }

    /// Summary of a completed block; `None` before completion.
    pub fn summary(&self) -> Option<BlockSummary> {
        if self.state != BlockState::Completed {
            return None;
        }
        let responses: Vec<QuestionResponse> = self.responses.iter().flatten().cloned().collect();
        let total_score: u32 = responses.iter().map(|r| u32::from(r.score)).sum();
        let average = f64::from(total_score) / self.questions.len() as f64;
        Some(BlockSummary {
            block_id: self.id.clone(),
            path: self.path.clone(),
            strand: self.strand.clone(),
            level: self.level,
            average,
            total_score,
            max_score: u32::from(self.level.points()) * self.questions.len() as u32,
            correct_count: responses.iter().filter(|r| r.is_correct).count(),
            next_level_unlocked: average >= self.unlock_threshold,
            responses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, Blank, GradedBy};

    fn question(id: &str, level: Level) -> Question {
        Question {
            id: id.into(),
            level,
            points: u32::from(level.points()),
            prompt: format!("Question {id}"),
            strand: "forces".into(),
            concept: "balanced forces".into(),
            keywords: vec!["newton".into()],
            kind: QuestionKind::FillBlank {
                template: "A force is measured in ___".into(),
                blanks: vec![Blank {
                    accepted: vec!["newtons".into()],
                    case_sensitive: false,
                    hints: vec!["Named after a scientist".into()],
                }],
            },
        }
    }

    fn block(n: usize, level: Level) -> QuestionBlock {
        let questions = (0..n).map(|i| question(&format!("q{i}"), level)).collect();
        QuestionBlock::new("b1", "p1", "forces", level, questions, &BlockConfig::default()).unwrap()
    }

    fn answer(block: &mut QuestionBlock, index: usize, score: u8) -> Completion {
        let (ticket, question) = block.begin_submission(index).unwrap();
        let response = QuestionResponse::new(
            &question,
            Answer::Blanks(vec![]),
            score,
            score == question.level.points(),
            "",
            GradedBy::Local,
        );
        block.complete_submission(&ticket, response)
    }

    fn run_through(block: &mut QuestionBlock, scores: &[u8]) -> BlockSummary {
        let mut last = None;
        for (i, &score) in scores.iter().enumerate() {
            answer(block, i, score);
            last = Some(block.advance(block.generation(), i));
        }
        match last {
            Some(Advance::Completed(summary)) => summary,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn empty_block_is_rejected() {
        let err = QuestionBlock::new("b", "p", "s", Level::Two, vec![], &BlockConfig::default())
            .unwrap_err();
        assert_eq!(err, BlockError::Empty);
    }

    #[test]
    fn submit_moves_active_to_feedback() {
        let mut b = block(2, Level::Four);
        assert_eq!(answer(&mut b, 0, 4), Completion::Recorded { correct: true });
        assert_eq!(b.state(), BlockState::Feedback(0));
        assert_eq!(b.attempts(), 0);
        assert!(matches!(b.advance(0, 0), Advance::Next(1)));
        assert_eq!(b.state(), BlockState::Active(1));
    }

    #[test]
    fn wrong_index_and_wrong_state_are_rejected() {
        let mut b = block(3, Level::Four);
        assert_eq!(
            b.begin_submission(2).unwrap_err(),
            BlockError::WrongQuestion {
                submitted: 2,
                current: 0
            }
        );
        answer(&mut b, 0, 0);
        assert_eq!(b.begin_submission(0).unwrap_err(), BlockError::NotActive);
    }

    #[test]
    fn second_submit_while_in_flight_is_rejected() {
        let mut b = block(2, Level::Four);
        let (ticket, _) = b.begin_submission(0).unwrap();
        assert_eq!(
            b.begin_submission(0).unwrap_err(),
            BlockError::EvaluationInFlight(0)
        );
        b.cancel_submission(&ticket);
        assert!(b.begin_submission(0).is_ok());
    }

    #[test]
    fn result_arriving_after_reset_is_stale() {
        let mut b = block(2, Level::Four);
        let (ticket, question) = b.begin_submission(0).unwrap();
        b.reset();
        let response = QuestionResponse::rejected(&question, Answer::Blanks(vec![]), "late");
        assert_eq!(b.complete_submission(&ticket, response), Completion::Stale);
        assert_eq!(b.state(), BlockState::Active(0));
        assert!(b.responses()[0].is_none());
    }

    #[test]
    fn stale_advance_is_a_noop() {
        let mut b = block(2, Level::Four);
        answer(&mut b, 0, 4);
        let generation = b.generation();
        b.reset();
        assert!(matches!(b.advance(generation, 0), Advance::Stale));
        assert_eq!(b.state(), BlockState::Active(0));
    }

    #[test]
    fn unlock_threshold_is_strict() {
        let mut six = block(2, Level::Eight);
        assert!(run_through(&mut six, &[4, 8]).next_level_unlocked);

        let mut five = block(2, Level::Eight);
        let summary = run_through(&mut five, &[2, 8]);
        assert_eq!(summary.average, 5.0);
        assert!(!summary.next_level_unlocked);
    }

    #[test]
    fn summary_totals() {
        let mut b = block(3, Level::Six);
        let summary = run_through(&mut b, &[6, 3, 5]);
        assert_eq!(summary.total_score, 14);
        assert_eq!(summary.max_score, 18);
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.reported_score(), 5);
        assert_eq!(summary.responses.len(), 3);
        assert_eq!(b.state(), BlockState::Completed);
    }

    #[test]
    fn retry_reopens_incorrect_question_and_overwrites() {
        let mut b = block(2, Level::Four);
        answer(&mut b, 0, 1);
        let old_generation = b.generation();
        assert_eq!(b.retry(), Ok(0));
        assert_eq!(b.state(), BlockState::Active(0));
        answer(&mut b, 0, 4);
        assert!(matches!(b.advance(old_generation, 0), Advance::Stale));
        assert_eq!(b.responses()[0].as_ref().unwrap().score, 4);
        assert_eq!(b.attempts(), 1);
    }

    #[test]
    fn retry_is_refused_when_correct_or_exhausted() {
        let mut b = block(1, Level::Four);
        answer(&mut b, 0, 4);
        assert_eq!(
            b.retry(),
            Err(BlockError::RetryNotAllowed("the answer was already correct"))
        );

        let mut b = block(1, Level::Four);
        for _ in 0..3 {
            answer(&mut b, 0, 0);
            let _ = b.retry();
        }
        assert_eq!(b.attempts(), 3);
        assert_eq!(
            b.retry(),
            Err(BlockError::RetryNotAllowed("no attempts remaining"))
        );
    }

    #[test]
    fn retry_requires_feedback() {
        let mut b = block(1, Level::Four);
        assert_eq!(b.retry(), Err(BlockError::NoPendingFeedback));
    }

    #[test]
    fn hint_appears_after_two_misses() {
        let mut b = block(2, Level::Four);
        answer(&mut b, 0, 0);
        assert!(b.hint().is_none());
        b.retry().unwrap();
        answer(&mut b, 0, 0);
        let hint = b.hint().unwrap();
        assert_eq!(hint.concept, "balanced forces");
        assert_eq!(hint.keywords, vec!["newton"]);
        assert_eq!(hint.blank_hints, vec![vec!["Named after a scientist"]]);

        b.reset();
        assert!(b.hint().is_none());
    }

    #[test]
    fn locked_block_needs_unlock() {
        let config = BlockConfig {
            lock_until_prerequisite: true,
            ..BlockConfig::default()
        };
        let mut b = QuestionBlock::new(
            "b",
            "p",
            "forces",
            Level::Six,
            vec![question("q", Level::Six)],
            &config,
        )
        .unwrap();
        assert_eq!(b.begin_submission(0).unwrap_err(), BlockError::Locked);
        b.reset();
        assert_eq!(b.state(), BlockState::Locked);
        assert!(b.unlock());
        assert!(!b.unlock());
        assert_eq!(b.state(), BlockState::Active(0));
    }

    #[test]
    fn reset_from_completed_clears_everything() {
        let mut b = block(1, Level::Two);
        run_through(&mut b, &[0]);
        b.reset();
        assert_eq!(b.state(), BlockState::Active(0));
        assert_eq!(b.attempts(), 0);
        assert!(b.responses().iter().all(Option::is_none));
        assert!(b.summary().is_none());
    }
}
