//! The `strandmark validate` command.

use std::path::PathBuf;

use anyhow::Result;
use strandmark_core::parser::{self, ValidationWarning};

pub fn execute(dataset_path: PathBuf, rubrics_path: Option<PathBuf>) -> Result<()> {
    let datasets = super::load_datasets(&dataset_path)?;

    let mut total_warnings = 0;

    for dataset in &datasets {
        let blocks: usize = dataset
            .questions
            .values()
            .flat_map(|strands| strands.values())
            .map(|levels| levels.len())
            .sum();
        println!(
            "Dataset: {} ({} questions in {} blocks)",
            dataset.name,
            dataset.question_count(),
            blocks
        );
        total_warnings += print_warnings(&parser::validate_dataset(dataset));
    }

    if let Some(path) = rubrics_path {
        let rubrics = parser::load_rubrics(&path)?;
        println!("Rubrics: {} ({} rubrics)", path.display(), rubrics.rubrics.len());
        total_warnings += print_warnings(&parser::validate_rubrics(&rubrics));
    }

    if total_warnings == 0 {
        println!("All files valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

fn print_warnings(warnings: &[ValidationWarning]) -> usize {
    for w in warnings {
        let prefix = w
            .item
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
    warnings.len()
}
