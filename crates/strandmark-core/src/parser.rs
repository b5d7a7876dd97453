//! TOML dataset, rubric and answers-file parsers.
//!
//! Loads question datasets from TOML files and directories, and validates them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Answer, Level, Question, QuestionKind};
use crate::rubric::RubricSet;

/// Learning path → strand → level → questions, in file order.
pub type QuestionTree = BTreeMap<String, BTreeMap<String, BTreeMap<Level, Vec<Question>>>>;

/// A loaded question dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub questions: QuestionTree,
}

impl Dataset {
    /// The questions of one block, in order.
    pub fn block(&self, path: &str, strand: &str, level: Level) -> Option<&[Question]> {
        self.questions
            .get(path)?
            .get(strand)?
            .get(&level)
            .map(Vec::as_slice)
    }

    /// Every question with its learning path.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Question)> {
        self.questions.iter().flat_map(|(path, strands)| {
            strands
                .values()
                .flat_map(|levels| levels.values().flatten())
                .map(move |q| (path.as_str(), q))
        })
    }

    pub fn question_count(&self) -> usize {
        self.iter().count()
    }

    pub fn find(&self, id: &str) -> Option<&Question> {
        self.iter().map(|(_, q)| q).find(|q| q.id == id)
    }

    fn insert(&mut self, path: String, question: Question) {
        self.questions
            .entry(path)
            .or_default()
            .entry(question.strand.clone())
            .or_default()
            .entry(question.level)
            .or_default()
            .push(question);
    }
}

#[derive(Debug, Deserialize)]
struct TomlDatasetFile {
    dataset: TomlDatasetHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlDatasetHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_path")]
    default_path: String,
}

fn default_path() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    #[serde(default)]
    path: Option<String>,
    #[serde(flatten)]
    question: Question,
}

/// Parse a single TOML file into a `Dataset`.
pub fn parse_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file: {}", path.display()))?;

    parse_dataset_str(&content, path)
}

/// Parse a TOML string into a `Dataset`.
pub fn parse_dataset_str(content: &str, source_path: &Path) -> Result<Dataset> {
    let parsed: TomlDatasetFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut dataset = Dataset {
        id: parsed.dataset.id,
        name: parsed.dataset.name,
        description: parsed.dataset.description,
        questions: BTreeMap::new(),
    };
    for entry in parsed.questions {
        let path = entry
            .path
            .unwrap_or_else(|| parsed.dataset.default_path.clone());
        dataset.insert(path, entry.question);
    }
    Ok(dataset)
}

/// Recursively load all `.toml` dataset files from a directory.
pub fn load_dataset_directory(dir: &Path) -> Result<Vec<Dataset>> {
    let mut datasets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            datasets.extend(load_dataset_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_dataset(&path) {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(datasets)
}

/// A warning from dataset or rubric validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The question id, or `path/strand` for rubrics.
    pub item: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn for_item(item: &str, message: impl Into<String>) -> Self {
        Self {
            item: Some(item.to_string()),
            message: message.into(),
        }
    }
}

/// Check a dataset for problems that would make questions unscoreable.
pub fn validate_dataset(dataset: &Dataset) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for (_, question) in dataset.iter() {
        if !seen_ids.insert(question.id.as_str()) {
            warnings.push(ValidationWarning::for_item(
                &question.id,
                format!("duplicate question ID: {}", question.id),
            ));
        }
    }

    for (_, question) in dataset.iter() {
        if let Err(e) = question.validate() {
            warnings.push(ValidationWarning::for_item(&question.id, e.to_string()));
        }
        if question.prompt.trim().is_empty() {
            warnings.push(ValidationWarning::for_item(&question.id, "prompt is empty"));
        }
        if question.strand.trim().is_empty() {
            warnings.push(ValidationWarning::for_item(&question.id, "strand is empty"));
        }
        if let QuestionKind::Mcq { options } = &question.kind {
            for option in options.iter().filter(|o| !o.is_correct) {
                let Some(partial) = option.level else {
                    continue;
                };
                if Level::try_from(partial).is_err() || partial >= question.level.points() {
                    warnings.push(ValidationWarning::for_item(
                        &question.id,
                        format!(
                            "option '{}' gives partial credit {} on a level {} question",
                            option.id, partial, question.level
                        ),
                    ));
                }
            }
        }
    }

    warnings
}

/// Parse a rubric file: a list of `[[rubrics]]` tables.
pub fn load_rubrics(path: &Path) -> Result<RubricSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rubric file: {}", path.display()))?;
    parse_rubrics_str(&content, path)
}

pub fn parse_rubrics_str(content: &str, source_path: &Path) -> Result<RubricSet> {
    toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
}

/// Flag rubric entries that can never contribute a sensible level.
pub fn validate_rubrics(rubrics: &RubricSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    for rubric in &rubrics.rubrics {
        let item = format!("{}/{}", rubric.path, rubric.strand);
        if !seen.insert(item.clone()) {
            warnings.push(ValidationWarning::for_item(&item, "duplicate rubric"));
        }
        for entry in rubric.keywords.iter().chain(&rubric.concepts) {
            if entry.label.trim().is_empty() {
                warnings.push(ValidationWarning::for_item(&item, "entry with empty label"));
            }
            if entry.level > Level::MAX_POINTS {
                warnings.push(ValidationWarning::for_item(
                    &item,
                    format!("'{}' has level {} above 8", entry.label, entry.level),
                ));
            }
        }
    }
    warnings
}

/// One scripted answer from an answers file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerEntry {
    pub question: String,
    pub answer: Answer,
    #[serde(default)]
    pub time_spent_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlAnswersFile {
    #[serde(default)]
    answers: Vec<AnswerEntry>,
}

/// Parse an answers file: a list of `[[answers]]` tables.
pub fn parse_answers(path: &Path) -> Result<Vec<AnswerEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answers file: {}", path.display()))?;
    parse_answers_str(&content, path)
}

pub fn parse_answers_str(content: &str, source_path: &Path) -> Result<Vec<AnswerEntry>> {
    let parsed: TomlAnswersFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    Ok(parsed.answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchPair, QuestionType};
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[dataset]
id = "forces-basics"
name = "Forces basics"
default_path = "explorer"

[[questions]]
id = "f2-mcq"
strand = "forces"
level = 2
type = "mcq"
prompt = "Which unit measures force?"
concept = "units"
keywords = ["newton"]

[[questions.options]]
id = "a"
text = "Newton"
is_correct = true

[[questions.options]]
id = "b"
text = "Joule"
is_correct = false

[[questions]]
id = "f2-blank"
strand = "forces"
level = 2
type = "fill_blank"
prompt = "Complete the sentence."
template = "Forces are measured in ___."

[[questions.blanks]]
accepted = ["newtons", "N"]
hints = ["Named after a scientist"]

[[questions]]
id = "f4-match"
path = "scientist"
strand = "forces"
level = 4
type = "match_click"
prompt = "Match each force to its cause."
left = ["gravity", "friction"]
right = ["mass", "surfaces"]
pairs = [{ left = "gravity", right = "mass" }, { left = "friction", right = "surfaces" }]

[[questions]]
id = "e6-short"
strand = "energy"
level = 6
type = "short_answer"
prompt = "Explain why a ball slows down."
min_words = 15
required_keywords = ["friction"]
"#;

    #[test]
    fn parse_valid_toml() {
        let dataset = parse_dataset_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(dataset.id, "forces-basics");
        assert_eq!(dataset.question_count(), 4);

        let block = dataset.block("explorer", "forces", Level::Two).unwrap();
        let ids: Vec<_> = block.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["f2-mcq", "f2-blank"]);
        assert_eq!(block[1].question_type(), QuestionType::FillBlank);

        let matching = dataset.block("scientist", "forces", Level::Four).unwrap();
        match &matching[0].kind {
            QuestionKind::MatchClick { pairs, .. } => {
                assert_eq!(pairs[0], MatchPair::new("gravity", "mass"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }

        let short = dataset.find("e6-short").unwrap();
        assert!(matches!(
            short.kind,
            QuestionKind::ShortAnswer {
                min_words: Some(15),
                ..
            }
        ));
        assert!(validate_dataset(&dataset).is_empty());
    }

    #[test]
    fn parse_rejects_unknown_level() {
        let bad = VALID_TOML.replace("level = 6", "level = 5");
        assert!(parse_dataset_str(&bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_dataset_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn validate_reports_shape_problems() {
        let toml = r#"
[dataset]
id = "broken"
name = "Broken"

[[questions]]
id = "dup"
strand = "matter"
level = 4
type = "mcq"
prompt = ""
options = [
  { id = "a", text = "x", is_correct = true },
  { id = "b", text = "y", is_correct = true },
]

[[questions]]
id = "dup"
strand = "matter"
level = 4
type = "mcq"
prompt = "Pick"
options = [
  { id = "a", text = "x", is_correct = true },
  { id = "b", text = "y", is_correct = false, level = 4 },
]
"#;
        let dataset = parse_dataset_str(toml, &PathBuf::from("broken.toml")).unwrap();
        let warnings = validate_dataset(&dataset);
        let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate question ID")));
        assert!(messages.iter().any(|m| m.contains("prompt is empty")));
        assert!(messages.iter().any(|m| m.contains("partial credit 4")));
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "not = [valid").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/more.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let datasets = load_dataset_directory(dir.path()).unwrap();
        assert_eq!(datasets.len(), 2);
        assert!(load_dataset_directory(&dir.path().join("good.toml")).is_err());
    }

    #[test]
    fn parse_rubrics_and_validate() {
        let toml = r#"
[[rubrics]]
path = "explorer"
strand = "energy"
suggestions = ["Describe where the energy ends up."]

[[rubrics.keywords]]
label = "energy transfer"
level = 6
synonyms = ["transfers energy"]

[[rubrics.concepts]]
label = "conservation"
level = 9
"#;
        let rubrics = parse_rubrics_str(toml, &PathBuf::from("rubrics.toml")).unwrap();
        let rubric = rubrics.find("explorer", "energy").unwrap();
        assert_eq!(rubric.keywords[0].synonyms, vec!["transfers energy"]);
        let warnings = validate_rubrics(&rubrics);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].item.as_deref(), Some("explorer/energy"));
    }

    #[test]
    fn parse_answers_file() {
        let toml = r#"
[[answers]]
question = "f2-mcq"
answer = { kind = "choice", value = "a" }
time_spent_ms = 4200

[[answers]]
question = "f2-blank"
answer = { kind = "blanks", value = ["newtons"] }

[[answers]]
question = "f4-match"
answer = { kind = "matches", value = [{ left = "gravity", right = "mass" }] }

[[answers]]
question = "e6-short"
answer = { kind = "text", value = "Friction slows it" }
"#;
        let answers = parse_answers_str(toml, &PathBuf::from("answers.toml")).unwrap();
        assert_eq!(answers.len(), 4);
        assert_eq!(answers[0].answer, Answer::Choice("a".into()));
        assert_eq!(answers[0].time_spent_ms, Some(4200));
        assert_eq!(
            answers[2].answer,
            Answer::Matches(vec![MatchPair::new("gravity", "mass")])
        );
        assert_eq!(answers[3].answer, Answer::Text("Friction slows it".into()));
    }
}
