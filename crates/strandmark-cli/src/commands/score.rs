//! The `strandmark score` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use strandmark_core::batch::{evaluate_batch, BatchReport, Submission};
use strandmark_core::parser;

pub async fn execute(
    dataset_path: PathBuf,
    answers_path: PathBuf,
    parallelism: usize,
    grader: Option<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = strandmark_graders::load_config_from(config_path.as_deref())?;
    let datasets = super::load_datasets(&dataset_path)?;
    let entries = parser::parse_answers(&answers_path)?;

    let mut submissions = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(question) = datasets.iter().find_map(|d| d.find(&entry.question)) else {
            tracing::warn!(question = %entry.question, "answer for unknown question, skipping");
            continue;
        };
        submissions.push(Submission {
            question: question.clone(),
            answer: entry.answer,
            time_spent_ms: entry.time_spent_ms,
        });
    }

    if submissions.is_empty() {
        anyhow::bail!("no answers matched questions in the dataset");
    }

    let evaluator = strandmark_graders::build_evaluator(&config, grader.as_deref())?;
    eprintln!("Scoring {} answer(s)...", submissions.len());
    let report = evaluate_batch(&evaluator, submissions, parallelism).await?;

    print_report(&report);

    if let Some(path) = output {
        report.save_json(&path)?;
        println!("\nReport saved to {}", path.display());
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Type", "Score", "Correct", "Graded by", "Feedback"]);
    for r in &report.responses {
        table.add_row(vec![
            Cell::new(&r.question_id),
            Cell::new(r.question_type),
            Cell::new(r.score),
            Cell::new(if r.is_correct { "yes" } else { "no" }),
            Cell::new(&r.graded_by),
            Cell::new(&r.feedback),
        ]);
    }
    println!("{table}");

    let mut by_type = Table::new();
    by_type.set_header(vec!["Type", "Answers", "Correct", "Score"]);
    for (name, totals) in &report.by_type {
        by_type.add_row(vec![
            Cell::new(name),
            Cell::new(totals.count),
            Cell::new(totals.correct),
            Cell::new(format!("{}/{}", totals.score, totals.max_score)),
        ]);
    }
    println!("\n{by_type}");

    println!(
        "\nCorrect: {}/{} ({:.0}%)",
        report.correct,
        report.responses.len(),
        report.accuracy() * 100.0
    );
    println!("Total score: {}/{}", report.total_score, report.max_score);
    if report.fallbacks > 0 {
        println!(
            "{} short answer(s) scored locally after the grader failed",
            report.fallbacks
        );
    }
}
