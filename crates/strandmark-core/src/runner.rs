//! Async driver for a [`QuestionBlock`].
//!
//! The runner evaluates submissions, schedules the delayed advance out of
//! feedback, reports completed blocks to the [`ProgressStore`] and persists
//! their responses. The block lives behind a mutex that is never held across
//! an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::block::{
    Advance, BlockConfig, BlockState, BlockSummary, Completion, Hint, QuestionBlock,
    SubmissionTicket,
};
use crate::error::BlockError;
use crate::evaluator::Evaluator;
use crate::model::{Answer, QuestionResponse};
use crate::progress::ProgressStore;
use crate::store::ResponseRecord;
use crate::traits::ResponseStore;

/// Observable runner state, published on every transition.
#[derive(Debug, Clone)]
pub struct BlockStatus {
    pub state: BlockState,
    pub generation: u64,
    pub attempts: u32,
    pub in_flight: Option<usize>,
    pub answered: usize,
    pub summary: Option<BlockSummary>,
}

impl BlockStatus {
    fn of(block: &QuestionBlock) -> Self {
        Self {
            state: block.state(),
            generation: block.generation(),
            attempts: block.attempts(),
            in_flight: block.in_flight(),
            answered: block.responses().iter().flatten().count(),
            summary: block.summary(),
        }
    }
}

/// What happened to a submitted answer.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Recorded; the block is showing feedback for it.
    Feedback(QuestionResponse),
    /// Evaluated after the block was reset or moved on, and dropped.
    Discarded,
}

struct PendingAdvance {
    generation: u64,
    index: usize,
    handle: JoinHandle<()>,
}

struct Shared {
    block: Mutex<QuestionBlock>,
    config: BlockConfig,
    evaluator: Evaluator,
    progress: Arc<ProgressStore>,
    store: Option<Arc<dyn ResponseStore>>,
    timer: Mutex<Option<PendingAdvance>>,
    status: watch::Sender<BlockStatus>,
}

/// Runs one block. Cheap to clone; clones drive the same block.
#[derive(Clone)]
pub struct BlockRunner {
    shared: Arc<Shared>,
}

impl BlockRunner {
    /// Responses of completed blocks are persisted to `store` when one is given.
    pub fn new(
        block: QuestionBlock,
        config: BlockConfig,
        evaluator: Evaluator,
        progress: Arc<ProgressStore>,
        store: Option<Arc<dyn ResponseStore>>,
    ) -> Self {
        let (status, _) = watch::channel(BlockStatus::of(&block));
        Self {
            shared: Arc::new(Shared {
                block: Mutex::new(block),
                config,
                evaluator,
                progress,
                store,
                timer: Mutex::new(None),
                status,
            }),
        }
    }

    pub fn status(&self) -> BlockStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BlockStatus> {
        self.shared.status.subscribe()
    }

    pub fn hint(&self) -> Option<Hint> {
        self.shared.lock_block().hint()
    }

    pub fn summary(&self) -> Option<BlockSummary> {
        self.shared.lock_block().summary()
    }

    /// Submit an answer for question `index`.
    pub async fn submit(&self, index: usize, answer: Answer) -> Result<SubmitOutcome, BlockError> {
        self.submit_timed(index, answer, None).await
    }

    /// Like [`BlockRunner::submit`], recording how long the learner spent
    /// on the question.
    pub async fn submit_timed(
        &self,
        index: usize,
        answer: Answer,
        time_spent: Option<Duration>,
    ) -> Result<SubmitOutcome, BlockError> {
        let (ticket, question) = self.shared.lock_block().begin_submission(index)?;
        self.shared.publish();
        let guard = InFlightGuard {
            shared: &self.shared,
            ticket: &ticket,
        };

        let mut response = self.shared.evaluator.evaluate(&question, answer).await;
        if let Some(spent) = time_spent {
            let ms = u64::try_from(spent.as_millis()).unwrap_or(u64::MAX);
            response = response.with_time_spent(ms);
        }

        let completion = self
            .shared
            .lock_block()
            .complete_submission(&ticket, response.clone());
        drop(guard);

        match completion {
            Completion::Stale => {
                tracing::debug!(
                    question = %ticket.question_id,
                    generation = ticket.generation,
                    "discarding evaluation for a superseded question"
                );
                self.shared.publish();
                Ok(SubmitOutcome::Discarded)
            }
            Completion::Recorded { correct } => {
                tracing::debug!(
                    question = %ticket.question_id,
                    score = response.score,
                    correct,
                    "answer recorded"
                );
                self.shared.publish();
                Shared::schedule_advance(&self.shared, ticket.generation, index, correct);
                Ok(SubmitOutcome::Feedback(response))
            }
        }
    }

    /// Skip the remaining feedback delay.
    pub async fn continue_now(&self) -> Result<Advance, BlockError> {
        let (generation, index) = {
            let block = self.shared.lock_block();
            match block.state() {
                BlockState::Feedback(index) => (block.generation(), index),
                _ => return Err(BlockError::NoPendingFeedback),
            }
        };
        self.shared.cancel_timer();
        Ok(self.shared.advance(generation, index).await)
    }

    /// Re-open an incorrectly answered question.
    pub fn retry(&self) -> Result<usize, BlockError> {
        let index = self.shared.lock_block().retry()?;
        self.shared.cancel_timer();
        tracing::debug!(index, "retrying question");
        self.shared.publish();
        Ok(index)
    }

    /// Start over from the first question.
    pub fn reset(&self) {
        self.shared.cancel_timer();
        self.shared.lock_block().reset();
        tracing::debug!("block reset");
        self.shared.publish();
    }

    pub fn unlock(&self) -> bool {
        let changed = self.shared.lock_block().unlock();
        if changed {
            self.shared.publish();
        }
        changed
    }
}

impl Shared {
    fn lock_block(&self) -> MutexGuard<'_, QuestionBlock> {
        self.block.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<PendingAdvance>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let status = BlockStatus::of(&self.lock_block());
        self.status.send_replace(status);
    }

    fn cancel_timer(&self) {
        if let Some(pending) = self.lock_timer().take() {
            pending.handle.abort();
        }
    }

    fn schedule_advance(this: &Arc<Self>, generation: u64, index: usize, correct: bool) {
        let delay = this.config.delay_for(correct);
        let shared = Arc::clone(this);
        let mut timer = this.lock_timer();
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Past this point the advance runs to completion.
            {
                let mut timer = shared.lock_timer();
                if timer
                    .as_ref()
                    .is_some_and(|p| p.generation == generation && p.index == index)
                {
                    timer.take();
                }
            }
            shared.advance(generation, index).await;
        });
        *timer = Some(PendingAdvance {
            generation,
            index,
            handle,
        });
    }

    async fn advance(&self, generation: u64, index: usize) -> Advance {
        let step = self.lock_block().advance(generation, index);
        match &step {
            Advance::Stale => {
                tracing::debug!(generation, index, "ignoring stale advance");
                return step;
            }
            Advance::Next(next) => tracing::debug!(next, "advanced to next question"),
            Advance::Completed(summary) => self.finish(summary).await,
        }
        self.publish();
        step
    }

    async fn finish(&self, summary: &BlockSummary) {
        tracing::info!(
            block = %summary.block_id,
            strand = %summary.strand,
            level = %summary.level,
            average = summary.average,
            unlocked = summary.next_level_unlocked,
            "block completed"
        );
        if let Err(e) =
            self.progress
                .record(&summary.strand, Some(summary.level), summary.reported_score())
        {
            tracing::warn!(error = %e, "could not record block score");
        }

        let Some(store) = &self.store else {
            return;
        };
        for response in &summary.responses {
            let record = ResponseRecord::new(
                summary.path.clone(),
                summary.strand.clone(),
                summary.level,
                summary.block_id.clone(),
                response.clone(),
            );
            if let Err(e) = store.save_response(&record).await {
                tracing::warn!(
                    question = %record.question_id,
                    error = %e,
                    "failed to persist response"
                );
            }
        }
    }
}

/// Clears the in-flight marker if a submission future is dropped mid-evaluation.
struct InFlightGuard<'a> {
    shared: &'a Shared,
    ticket: &'a SubmissionTicket,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock_block().cancel_submission(self.ticket);
    }
}
