//! Configuration loading and grader factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use strandmark_core::block::BlockConfig;
use strandmark_core::evaluator::Evaluator;
use strandmark_core::progress::{StrandProgress, DEFAULT_BADGES, DEFAULT_STRANDS};
use strandmark_core::traits::ShortAnswerGrader;

use crate::anthropic::AnthropicGrader;
use crate::mock::MockGrader;
use crate::ollama::OllamaGrader;

/// Configuration for a single short-answer grader.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraderConfig {
    Anthropic {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default)]
        model: Option<String>,
    },
    /// Offline grader. Without a `score` every call fails.
    Mock {
        #[serde(default)]
        score: Option<u8>,
        #[serde(default)]
        feedback: String,
        #[serde(default)]
        latency_ms: u64,
    },
}

impl std::fmt::Debug for GraderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderConfig::Anthropic {
                api_key: _,
                model,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .finish(),
            GraderConfig::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            GraderConfig::Mock {
                score,
                feedback,
                latency_ms,
            } => f
                .debug_struct("Mock")
                .field("score", score)
                .field("feedback", feedback)
                .field("latency_ms", latency_ms)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    crate::ollama::DEFAULT_BASE_URL.to_string()
}

/// Top-level strandmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrandmarkConfig {
    /// Grader configurations keyed by name.
    #[serde(default)]
    pub graders: HashMap<String, GraderConfig>,
    /// Grader used for short answers; local scoring when unset.
    #[serde(default)]
    pub default_grader: Option<String>,
    /// Time an external grader gets before local scoring takes over.
    #[serde(default = "default_grader_timeout")]
    pub grader_timeout_ms: u64,
    /// Feedback display time after a correct answer.
    #[serde(default = "default_correct_delay")]
    pub correct_delay_ms: u64,
    /// Feedback display time after an incorrect answer.
    #[serde(default = "default_incorrect_delay")]
    pub incorrect_delay_ms: u64,
    /// Block average needed to unlock the next level.
    #[serde(default = "default_unlock_threshold")]
    pub unlock_threshold: f64,
    /// Incorrect answers allowed per block before retries are refused.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Strand ids in display order.
    #[serde(default = "default_strands")]
    pub strands: Vec<String>,
    /// Badge names, one per strand in the same order.
    #[serde(default = "default_badges")]
    pub badges: Vec<String>,
    /// Where responses and progress snapshots are written.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_grader_timeout() -> u64 {
    8000
}
fn default_correct_delay() -> u64 {
    1500
}
fn default_incorrect_delay() -> u64 {
    3000
}
fn default_unlock_threshold() -> f64 {
    6.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_strands() -> Vec<String> {
    DEFAULT_STRANDS.iter().map(|s| s.to_string()).collect()
}
fn default_badges() -> Vec<String> {
    DEFAULT_BADGES.iter().map(|s| s.to_string()).collect()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./strandmark-data")
}

impl Default for StrandmarkConfig {
    fn default() -> Self {
        Self {
            graders: HashMap::new(),
            default_grader: None,
            grader_timeout_ms: default_grader_timeout(),
            correct_delay_ms: default_correct_delay(),
            incorrect_delay_ms: default_incorrect_delay(),
            unlock_threshold: default_unlock_threshold(),
            max_attempts: default_max_attempts(),
            strands: default_strands(),
            badges: default_badges(),
            data_dir: default_data_dir(),
        }
    }
}

impl StrandmarkConfig {
    pub fn block_config(&self) -> BlockConfig {
        BlockConfig {
            correct_delay: Duration::from_millis(self.correct_delay_ms),
            incorrect_delay: Duration::from_millis(self.incorrect_delay_ms),
            unlock_threshold: self.unlock_threshold,
            max_attempts: self.max_attempts,
            lock_until_prerequisite: false,
        }
    }

    /// Fresh progress for the configured strands and badges.
    pub fn new_progress(&self) -> StrandProgress {
        StrandProgress::new(self.strands.clone(), self.badges.clone())
    }

    pub fn grader_timeout(&self) -> Duration {
        Duration::from_millis(self.grader_timeout_ms)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a grader config.
fn resolve_grader_config(config: &GraderConfig) -> GraderConfig {
    match config {
        GraderConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => GraderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            model: model.as_ref().map(|m| resolve_env_vars(m)),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        GraderConfig::Ollama { base_url, model } => GraderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
            model: model.as_ref().map(|m| resolve_env_vars(m)),
        },
        GraderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `strandmark.toml` in the current directory
/// 2. `~/.config/strandmark/config.toml`
///
/// Environment variable override: `STRANDMARK_ANTHROPIC_KEY`.
pub fn load_config() -> Result<StrandmarkConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<StrandmarkConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("strandmark.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config_str(
                &std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?,
                &path,
            )?
        }
        None => StrandmarkConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("STRANDMARK_ANTHROPIC_KEY") {
        let entry = config
            .graders
            .entry("anthropic".into())
            .or_insert(GraderConfig::Anthropic {
                api_key: String::new(),
                model: None,
                base_url: None,
            });
        if let GraderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    // Resolve env vars in all grader configs
    let resolved: HashMap<String, GraderConfig> = config
        .graders
        .iter()
        .map(|(k, v)| (k.clone(), resolve_grader_config(v)))
        .collect();
    config.graders = resolved;

    Ok(config)
}

fn parse_config_str(content: &str, path: &Path) -> Result<StrandmarkConfig> {
    let config = toml::from_str::<StrandmarkConfig>(content)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    if let Some(name) = &config.default_grader {
        anyhow::ensure!(
            config.graders.contains_key(name),
            "default_grader '{name}' is not configured under [graders]"
        );
    }
    anyhow::ensure!(
        config.badges.len() <= config.strands.len(),
        "{} badges configured for {} strands",
        config.badges.len(),
        config.strands.len()
    );
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("strandmark"))
}

/// Create a grader instance from its configuration.
pub fn create_grader(name: &str, config: &GraderConfig) -> Result<Box<dyn ShortAnswerGrader>> {
    let grader: Box<dyn ShortAnswerGrader> = match config {
        GraderConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => {
            anyhow::ensure!(
                !api_key.is_empty(),
                "grader '{name}' has no API key (set STRANDMARK_ANTHROPIC_KEY)"
            );
            Box::new(AnthropicGrader::new(api_key, model.clone(), base_url.clone())?)
        }
        GraderConfig::Ollama { base_url, model } => {
            Box::new(OllamaGrader::new(base_url, model.clone())?)
        }
        GraderConfig::Mock {
            score,
            feedback,
            latency_ms,
        } => {
            let mock = match score {
                Some(score) => MockGrader::with_fixed_verdict(*score, feedback),
                None => MockGrader::failing(),
            };
            Box::new(mock.with_latency(Duration::from_millis(*latency_ms)))
        }
    };
    Ok(grader)
}

/// Build the evaluator for `grader` (or the configured default).
///
/// With no grader selected, short answers are scored locally.
pub fn build_evaluator(config: &StrandmarkConfig, grader: Option<&str>) -> Result<Evaluator> {
    let Some(name) = grader.or(config.default_grader.as_deref()) else {
        return Ok(Evaluator::local());
    };
    let grader_config = config
        .graders
        .get(name)
        .with_context(|| format!("grader '{name}' not found in config"))?;
    let grader: Arc<dyn ShortAnswerGrader> = Arc::from(create_grader(name, grader_config)?);
    tracing::info!(grader = name, "using external short-answer grader");
    Ok(Evaluator::with_grader(grader, config.grader_timeout()))
}
