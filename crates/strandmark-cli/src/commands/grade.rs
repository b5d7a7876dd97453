//! The `strandmark grade` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use strandmark_core::parser;
use strandmark_core::progress::ProgressStore;
use strandmark_core::rubric::{RubricEvaluation, RubricEvaluator};

use super::ConsoleSink;

pub fn execute(
    rubrics_path: PathBuf,
    path: String,
    strand: String,
    artifact_path: PathBuf,
    format: String,
    progress: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let rubrics = parser::load_rubrics(&rubrics_path)?;
    let rubric = rubrics
        .find(&path, &strand)
        .with_context(|| format!("no rubric for path '{path}', strand '{strand}'"))?;
    let raw = std::fs::read_to_string(&artifact_path)
        .with_context(|| format!("failed to read artifact: {}", artifact_path.display()))?;

    let evaluation = RubricEvaluator::default().evaluate(&raw, rubric);
    tracing::debug!(strand = %strand, level = evaluation.final_level, "artifact graded");

    match format.as_str() {
        "text" => print_text(&strand, &evaluation),
        "json" => println!("{}", serde_json::to_string_pretty(&evaluation)?),
        other => anyhow::bail!("unknown format '{other}'. Use: text, json"),
    }

    if let Some(progress_path) = progress {
        let config = strandmark_graders::load_config_from(config_path.as_deref())?;
        let store = ProgressStore::new(
            super::load_progress(&config, &progress_path)?,
            Arc::new(ConsoleSink),
        );
        store.record(&strand, None, evaluation.final_level)?;
        store.finish().save_json(&progress_path)?;
    }

    Ok(())
}

fn print_text(strand: &str, evaluation: &RubricEvaluation) {
    let mut table = Table::new();
    table.set_header(vec!["Component", "Level"]);
    for (name, level) in [
        ("Keywords", evaluation.keyword_level),
        ("Concepts", evaluation.concept_level),
        ("Structure", evaluation.structure_level),
        ("Images", evaluation.image_level),
        ("Length", evaluation.length_level),
    ] {
        table.add_row(vec![Cell::new(name), Cell::new(level)]);
    }
    println!("{table}");

    println!("\nStrand: {strand}");
    println!("Final level: {}", evaluation.final_level);
    println!("Words: {}", evaluation.word_count);
    if !evaluation.matched_keywords.is_empty() {
        println!("Keywords found: {}", evaluation.matched_keywords.join(", "));
    }
    if !evaluation.matched_concepts.is_empty() {
        println!("Concepts found: {}", evaluation.matched_concepts.join(", "));
    }
    if !evaluation.suggestions.is_empty() {
        println!("\nSuggestions:");
        for suggestion in &evaluation.suggestions {
            println!("  - {suggestion}");
        }
    }
}
