//! The `strandmark simulate` command.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use strandmark_core::block::{BlockState, BlockSummary, QuestionBlock};
use strandmark_core::error::BlockError;
use strandmark_core::model::{Answer, Level, Question, QuestionResponse};
use strandmark_core::parser;
use strandmark_core::progress::ProgressStore;
use strandmark_core::runner::{BlockRunner, SubmitOutcome};
use strandmark_core::store::{JsonFileStore, ResponseFilter};
use strandmark_core::traits::ResponseStore;

use super::ConsoleSink;

pub struct SimulateArgs {
    pub dataset: PathBuf,
    pub answers: PathBuf,
    pub path: String,
    pub strand: String,
    pub level: Level,
    pub instant: bool,
    pub progress: Option<PathBuf>,
    pub grader: Option<String>,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    let config = strandmark_graders::load_config_from(args.config.as_deref())?;
    let datasets = super::load_datasets(&args.dataset)?;
    let questions = datasets
        .iter()
        .find_map(|d| d.block(&args.path, &args.strand, args.level))
        .with_context(|| {
            format!(
                "no questions for path '{}', strand '{}', level {}",
                args.path, args.strand, args.level
            )
        })?
        .to_vec();

    let mut scripted: HashMap<String, VecDeque<(Answer, Option<Duration>)>> = HashMap::new();
    for entry in parser::parse_answers(&args.answers)? {
        let spent = entry.time_spent_ms.map(Duration::from_millis);
        scripted
            .entry(entry.question)
            .or_default()
            .push_back((entry.answer, spent));
    }

    let block_config = config.block_config();

    let progress_path = super::progress_path(&config, args.progress);
    let progress = Arc::new(ProgressStore::new(
        super::load_progress(&config, &progress_path)?,
        Arc::new(ConsoleSink),
    ));
    let evaluator = strandmark_graders::build_evaluator(&config, args.grader.as_deref())?;

    let block_id = format!("{}/{}/{}", args.path, args.strand, args.level);
    let block = QuestionBlock::new(
        block_id.as_str(),
        args.path.as_str(),
        args.strand.as_str(),
        args.level,
        questions.clone(),
        &block_config,
    )?;
    let store = Arc::new(JsonFileStore::new(&config.data_dir));
    let filter = ResponseFilter::block(&args.path, &args.strand, args.level);
    let previous = match store.load_responses(&filter).await {
        Ok(previous) => previous,
        Err(e) => {
            tracing::warn!(error = %e, "could not load previous responses");
            HashMap::new()
        }
    };

    let runner = BlockRunner::new(
        block,
        block_config,
        evaluator,
        Arc::clone(&progress),
        Some(store),
    );
    let mut status_rx = runner.subscribe();

    println!("Block {block_id} ({} questions)", questions.len());
    print_previous_attempt(&questions, &previous);

    loop {
        let index = match runner.status().state {
            BlockState::Active(index) => index,
            BlockState::Completed => break,
            BlockState::Locked => anyhow::bail!("block {block_id} is locked"),
            BlockState::Feedback(index) => {
                status_rx
                    .wait_for(|s| s.state != BlockState::Feedback(index))
                    .await?;
                continue;
            }
        };
        let question = &questions[index];
        let (answer, spent) = scripted
            .get_mut(&question.id)
            .and_then(VecDeque::pop_front)
            .with_context(|| format!("no scripted answer left for question '{}'", question.id))?;

        let response = match runner.submit_timed(index, answer, spent).await? {
            SubmitOutcome::Feedback(response) => response,
            SubmitOutcome::Discarded => continue,
        };
        print_response(index, question.level, &response);

        let has_retry = scripted.get(&question.id).is_some_and(|q| !q.is_empty());
        if !response.is_correct && has_retry {
            match runner.retry() {
                Ok(_) => {
                    if let Some(hint) = runner.hint() {
                        println!("    Hint: think about {}", hint.concept);
                    }
                    println!("    Retrying {}", question.id);
                    continue;
                }
                Err(e) => println!("    Retry refused: {e}"),
            }
        }

        if args.instant {
            match runner.continue_now().await {
                Ok(_) | Err(BlockError::NoPendingFeedback) => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            status_rx
                .wait_for(|s| s.state != BlockState::Feedback(index))
                .await?;
        }
    }

    let summary = runner
        .summary()
        .context("block finished without a summary")?;
    print_summary(&summary, config.unlock_threshold);

    drop(runner);
    let snapshot = match Arc::try_unwrap(progress) {
        Ok(store) => store.finish(),
        Err(shared) => shared.snapshot(),
    };
    snapshot.save_json(&progress_path)?;
    println!("Overall progress: {}%", snapshot.overall_progress());
    println!("Progress saved to {}", progress_path.display());

    Ok(())
}

fn print_response(index: usize, level: Level, response: &QuestionResponse) {
    println!(
        "  [{}] {}: {}/{} {} ({})",
        index + 1,
        response.question_id,
        response.score,
        level,
        if response.is_correct {
            "correct"
        } else {
            "incorrect"
        },
        response.feedback
    );
}

fn print_previous_attempt(questions: &[Question], previous: &HashMap<String, QuestionResponse>) {
    let answered: Vec<(&Question, &QuestionResponse)> = questions
        .iter()
        .filter_map(|q| previous.get(&q.id).map(|r| (q, r)))
        .collect();
    if answered.is_empty() {
        return;
    }
    let score: u32 = answered.iter().map(|(_, r)| u32::from(r.score)).sum();
    let max: u32 = answered.iter().map(|(q, _)| u32::from(q.level.points())).sum();
    println!(
        "Previous attempt: {} of {} questions, {score}/{max} points",
        answered.len(),
        questions.len()
    );
}

fn print_summary(summary: &BlockSummary, threshold: f64) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Type", "Score", "Correct", "Graded by"]);
    for r in &summary.responses {
        table.add_row(vec![
            Cell::new(&r.question_id),
            Cell::new(r.question_type),
            Cell::new(r.score),
            Cell::new(if r.is_correct { "yes" } else { "no" }),
            Cell::new(&r.graded_by),
        ]);
    }
    println!("\n{table}");

    println!(
        "\nBlock average: {:.2} ({}/{} points, {} correct)",
        summary.average, summary.total_score, summary.max_score, summary.correct_count
    );
    println!("Reported score: {}", summary.reported_score());
    if summary.next_level_unlocked {
        match summary.level.next() {
            Some(next) => println!("Next level unlocked: level {next}"),
            None => println!("Top level mastered"),
        }
    } else {
        println!("Next level locked (needs an average of {threshold:.1})");
    }
}
