pub mod grade;
pub mod init;
pub mod progress;
pub mod score;
pub mod simulate;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use strandmark_core::model::Level;
use strandmark_core::parser::{self, Dataset};
use strandmark_core::progress::StrandProgress;
use strandmark_core::traits::ProgressSink;
use strandmark_graders::StrandmarkConfig;

/// Load one dataset file, or every dataset under a directory.
pub fn load_datasets(path: &Path) -> Result<Vec<Dataset>> {
    if path.is_dir() {
        parser::load_dataset_directory(path)
    } else {
        Ok(vec![parser::parse_dataset(path)?])
    }
}

/// Load an existing progress snapshot, or start fresh from the config.
pub fn load_progress(config: &StrandmarkConfig, path: &Path) -> Result<StrandProgress> {
    if path.exists() {
        StrandProgress::load_json(path)
            .with_context(|| format!("failed to load progress snapshot: {}", path.display()))
    } else {
        Ok(config.new_progress())
    }
}

pub fn progress_path(config: &StrandmarkConfig, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| config.data_dir.join("progress.json"))
}

/// Prints progress events as they happen.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_progress_update(&self, strand: &str, level: Option<Level>, score: u8) {
        match level {
            Some(level) => println!("Progress: {strand} level {level} scored {score}"),
            None => println!("Progress: {strand} scored {score}"),
        }
    }

    fn on_badge_earned(&self, badge: &str) {
        println!("Badge earned: {badge}");
    }
}
