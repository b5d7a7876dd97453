//! Response persistence: an in-memory store and a JSON-lines file store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::model::{Level, QuestionResponse};
use crate::traits::ResponseStore;

/// One persisted answer, keyed by where it was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub path: String,
    pub strand: String,
    pub level: Level,
    pub block_id: String,
    pub question_id: String,
    pub response: QuestionResponse,
    pub saved_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn new(
        path: impl Into<String>,
        strand: impl Into<String>,
        level: Level,
        block_id: impl Into<String>,
        response: QuestionResponse,
    ) -> Self {
        Self {
            path: path.into(),
            strand: strand.into(),
            level,
            block_id: block_id.into(),
            question_id: response.question_id.clone(),
            response,
            saved_at: Utc::now(),
        }
    }
}

/// Selects records by location. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFilter {
    pub path: Option<String>,
    pub strand: Option<String>,
    pub level: Option<Level>,
    pub block_id: Option<String>,
}

impl ResponseFilter {
    pub fn block(path: &str, strand: &str, level: Level) -> Self {
        Self {
            path: Some(path.to_string()),
            strand: Some(strand.to_string()),
            level: Some(level),
            block_id: None,
        }
    }

    pub fn matches(&self, record: &ResponseRecord) -> bool {
        self.path.as_ref().map_or(true, |p| *p == record.path)
            && self.strand.as_ref().map_or(true, |s| *s == record.strand)
            && self.level.map_or(true, |l| l == record.level)
            && self.block_id.as_ref().map_or(true, |b| *b == record.block_id)
    }
}

/// Latest response per question id; later records win ties.
fn latest_by_question<'a>(
    records: impl IntoIterator<Item = &'a ResponseRecord>,
    filter: &ResponseFilter,
) -> HashMap<String, QuestionResponse> {
    let mut latest: HashMap<String, &ResponseRecord> = HashMap::new();
    for record in records.into_iter().filter(|r| filter.matches(r)) {
        match latest.get(&record.question_id) {
            Some(existing) if existing.saved_at > record.saved_at => {}
            _ => {
                latest.insert(record.question_id.clone(), record);
            }
        }
    }
    latest
        .into_iter()
        .map(|(id, record)| (id, record.response.clone()))
        .collect()
}

/// Keeps records in process memory.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ResponseRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn save_response(&self, record: &ResponseRecord) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn load_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<HashMap<String, QuestionResponse>, PersistenceError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(latest_by_question(records.iter(), filter))
    }
}

/// Appends one JSON record per line to `<dir>/responses.jsonl`.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "responses.jsonl";

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResponseStore for JsonFileStore {
    async fn save_response(&self, record: &ResponseRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<HashMap<String, QuestionResponse>, PersistenceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        let records = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<ResponseRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(latest_by_question(records.iter(), filter))
    }
}
