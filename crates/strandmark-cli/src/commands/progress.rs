//! The `strandmark progress` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use strandmark_core::progress::StrandProgress;

pub fn execute(snapshot_path: PathBuf) -> Result<()> {
    let progress = StrandProgress::load_json(&snapshot_path)?;

    let mut table = Table::new();
    table.set_header(vec!["Strand", "Best", "Badge", "Earned"]);
    for (index, strand) in progress.strands.iter().enumerate() {
        let badge = progress.badges.iter().position(|b| b.strand_index == index);
        let (name, earned) = match badge {
            Some(i) => (
                progress.badges[i].name.as_str(),
                if progress.earned[i] { "yes" } else { "no" },
            ),
            None => ("-", "-"),
        };
        table.add_row(vec![
            Cell::new(strand),
            Cell::new(progress.best_scores[index]),
            Cell::new(name),
            Cell::new(earned),
        ]);
    }
    println!("{table}");

    println!("\nOverall progress: {}%", progress.overall_progress());
    let badges = progress.earned_badges();
    if badges.is_empty() {
        println!("No badges earned yet.");
    } else {
        println!("Badges: {}", badges.join(", "));
    }

    Ok(())
}
