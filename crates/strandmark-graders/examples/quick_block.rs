//! Quick block example: run one question block programmatically.
//!
//! Loads a dataset, scores short answers with the grader from
//! `strandmark.toml` (or locally when none is configured), and answers every
//! question with its first correct option or accepted blank.
//!
//! ```bash
//! strandmark init
//! cargo run --example quick_block -- datasets/example.toml forces 6
//! ```

use std::env;
use std::sync::Arc;

use anyhow::Context;
use strandmark_core::block::{Advance, BlockConfig, QuestionBlock};
use strandmark_core::model::{Answer, Level, Question, QuestionKind};
use strandmark_core::parser;
use strandmark_core::progress::{NoopSink, ProgressStore};
use strandmark_core::runner::{BlockRunner, SubmitOutcome};
use strandmark_graders::{build_evaluator, load_config};

/// The answer a learner who knows everything would give.
fn model_answer(question: &Question) -> Answer {
    match &question.kind {
        QuestionKind::Mcq { options } => Answer::Choice(
            options
                .iter()
                .find(|o| o.is_correct)
                .map(|o| o.id.clone())
                .unwrap_or_default(),
        ),
        QuestionKind::FillBlank { blanks, .. } => Answer::Blanks(
            blanks
                .iter()
                .map(|b| b.accepted.first().cloned().unwrap_or_default())
                .collect(),
        ),
        QuestionKind::MatchClick { pairs, .. } => Answer::Matches(pairs.clone()),
        QuestionKind::ShortAnswer {
            required_keywords,
            required_concepts,
            ..
        } => Answer::Text(format!(
            "This answer covers {} and explains {} in my own words.",
            required_keywords.join(", "),
            required_concepts.join(", ")
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let (Some(path), Some(strand), Some(level)) = (args.get(1), args.get(2), args.get(3)) else {
        anyhow::bail!("Usage: quick_block <dataset.toml> <strand> <level>");
    };
    let level: Level = level.parse().map_err(anyhow::Error::msg)?;

    let config = load_config()?;
    let dataset = parser::parse_dataset(path.as_ref())?;
    println!("Loaded dataset: {} ({} questions)", dataset.name, dataset.question_count());

    let questions = dataset
        .block("default", strand, level)
        .context("no block for that strand and level")?
        .to_vec();

    let block_config = BlockConfig::default();
    let block = QuestionBlock::new(
        format!("default/{strand}/{level}"),
        "default",
        strand.as_str(),
        level,
        questions.clone(),
        &block_config,
    )?;
    let progress = Arc::new(ProgressStore::new(config.new_progress(), Arc::new(NoopSink)));
    let evaluator = build_evaluator(&config, None)?;
    let runner = BlockRunner::new(block, block_config, evaluator, Arc::clone(&progress), None);

    for (index, question) in questions.iter().enumerate() {
        if let SubmitOutcome::Feedback(response) =
            runner.submit(index, model_answer(question)).await?
        {
            println!("  {}: {} ({})", question.id, response.score, response.feedback);
        }
        if let Advance::Completed(summary) = runner.continue_now().await? {
            println!("\nBlock complete!");
            println!("  Average: {:.2}", summary.average);
            println!("  Unlocked next level: {}", summary.next_level_unlocked);
        }
    }

    println!("  Overall progress: {}%", progress.overall_progress());
    Ok(())
}
