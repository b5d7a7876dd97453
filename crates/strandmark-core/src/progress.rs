//! Per-strand mastery, badges and overall progress.
//!
//! A [`ProgressStore`] is created at session start and consumed with
//! [`ProgressStore::finish`] at session end. Components that report scores
//! hold it by `Arc`; there is no global instance.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProgressError;
use crate::model::Level;
use crate::traits::ProgressSink;

/// Strand ids used when no configuration overrides them.
pub const DEFAULT_STRANDS: [&str; 4] = ["forces", "energy", "matter", "living-things"];

/// Badge names, one per default strand.
pub const DEFAULT_BADGES: [&str; 4] = [
    "Force Master",
    "Energy Expert",
    "Matter Maven",
    "Life Scientist",
];

/// A badge slot: earned once the strand at `strand_index` reaches `threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRule {
    pub strand_index: usize,
    pub threshold: u8,
    pub name: String,
}

/// Snapshot of a learner's progress across strands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandProgress {
    /// Strand ids; position is the strand index.
    pub strands: Vec<String>,
    /// Best score per strand, index-aligned with `strands`.
    pub best_scores: Vec<u8>,
    pub badges: Vec<BadgeRule>,
    /// Earned flags, index-aligned with `badges`.
    pub earned: Vec<bool>,
    pub updated_at: DateTime<Utc>,
}

/// What a single `record` call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub best: u8,
    pub improved: bool,
    pub badges_earned: Vec<String>,
}

impl StrandProgress {
    /// Fresh progress with one badge per strand at the maximum score.
    pub fn new(strands: Vec<String>, badge_names: Vec<String>) -> Self {
        let badges: Vec<BadgeRule> = badge_names
            .into_iter()
            .zip(0..strands.len())
            .map(|(name, strand_index)| BadgeRule {
                strand_index,
                threshold: Level::MAX_POINTS,
                name,
            })
            .collect();
        Self {
            best_scores: vec![0; strands.len()],
            earned: vec![false; badges.len()],
            strands,
            badges,
            updated_at: Utc::now(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_STRANDS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_BADGES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn strand_index(&self, strand: &str) -> Option<usize> {
        self.strands.iter().position(|s| s == strand)
    }

    pub fn best_score(&self, strand: &str) -> Option<u8> {
        self.strand_index(strand).map(|i| self.best_scores[i])
    }

    /// `round(100 * sum(best) / (strands * 8))`.
    pub fn overall_progress(&self) -> u8 {
        if self.strands.is_empty() {
            return 0;
        }
        let total: u32 = self.best_scores.iter().map(|&s| u32::from(s)).sum();
        let max = self.strands.len() as f64 * f64::from(Level::MAX_POINTS);
        (100.0 * f64::from(total) / max).round() as u8
    }

    pub fn earned_badges(&self) -> Vec<&str> {
        self.badges
            .iter()
            .zip(&self.earned)
            .filter(|(_, &earned)| earned)
            .map(|(rule, _)| rule.name.as_str())
            .collect()
    }

    fn record(&mut self, strand: &str, score: u8) -> Result<RecordOutcome, ProgressError> {
        let index = self
            .strand_index(strand)
            .ok_or_else(|| ProgressError::UnknownStrand(strand.to_string()))?;
        let score = score.min(Level::MAX_POINTS);
        let improved = score > self.best_scores[index];
        if improved {
            self.best_scores[index] = score;
        }
        let best = self.best_scores[index];

        let mut badges_earned = Vec::new();
        for (rule, earned) in self.badges.iter().zip(self.earned.iter_mut()) {
            if !*earned && rule.strand_index == index && best >= rule.threshold {
                *earned = true;
                badges_earned.push(rule.name.clone());
            }
        }
        self.updated_at = Utc::now();

        Ok(RecordOutcome {
            best,
            improved,
            badges_earned,
        })
    }

    fn check_shape(&self) -> Result<()> {
        anyhow::ensure!(
            self.best_scores.len() == self.strands.len(),
            "progress has {} strands but {} scores",
            self.strands.len(),
            self.best_scores.len()
        );
        anyhow::ensure!(
            self.earned.len() == self.badges.len(),
            "progress has {} badges but {} earned flags",
            self.badges.len(),
            self.earned.len()
        );
        if let Some((strand, &score)) = self
            .strands
            .iter()
            .zip(&self.best_scores)
            .find(|(_, score)| **score > Level::MAX_POINTS)
        {
            anyhow::bail!(
                "strand '{strand}' has best score {score}, above the maximum of {}",
                Level::MAX_POINTS
            );
        }
        if let Some(rule) = self
            .badges
            .iter()
            .find(|r| r.strand_index >= self.strands.len())
        {
            anyhow::bail!(
                "badge '{}' refers to strand {} of {}",
                rule.name,
                rule.strand_index,
                self.strands.len()
            );
        }
        Ok(())
    }

    /// Save the snapshot as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize progress")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write progress to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot saved with [`StrandProgress::save_json`].
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read progress from {}", path.display()))?;
        let progress: StrandProgress =
            serde_json::from_str(&content).context("failed to parse progress JSON")?;
        progress.check_shape()?;
        Ok(progress)
    }
}

/// Session-scoped owner of a learner's [`StrandProgress`].
pub struct ProgressStore {
    state: Mutex<StrandProgress>,
    sink: std::sync::Arc<dyn ProgressSink>,
}

impl ProgressStore {
    pub fn new(progress: StrandProgress, sink: std::sync::Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(progress),
            sink,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StrandProgress> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a block or rubric score. Best scores never decrease and
    /// badges, once earned, stay earned.
    pub fn record(
        &self,
        strand: &str,
        level: Option<Level>,
        score: u8,
    ) -> Result<RecordOutcome, ProgressError> {
        let outcome = self.lock().record(strand, score)?;

        self.sink
            .on_progress_update(strand, level, score.min(Level::MAX_POINTS));
        for badge in &outcome.badges_earned {
            tracing::info!(strand, badge = %badge, "badge earned");
            self.sink.on_badge_earned(badge);
        }
        Ok(outcome)
    }

    pub fn best_score(&self, strand: &str) -> Option<u8> {
        self.lock().best_score(strand)
    }

    pub fn overall_progress(&self) -> u8 {
        self.lock().overall_progress()
    }

    pub fn snapshot(&self) -> StrandProgress {
        self.lock().clone()
    }

    /// End the session and hand back the final progress.
    pub fn finish(self) -> StrandProgress {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Progress sink that drops every event.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress_update(&self, _: &str, _: Option<Level>, _: u8) {}
    fn on_badge_earned(&self, _: &str) {}
}

/// An outbound event for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    ProgressUpdated {
        strand: String,
        level: Option<Level>,
        score: u8,
    },
    BadgeEarned {
        badge: String,
    },
}

/// Forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("progress event receiver dropped");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress_update(&self, strand: &str, level: Option<Level>, score: u8) {
        self.send(ProgressEvent::ProgressUpdated {
            strand: strand.to_string(),
            level,
            score,
        });
    }

    fn on_badge_earned(&self, badge: &str) {
        self.send(ProgressEvent::BadgeEarned {
            badge: badge.to_string(),
        });
    }
}
