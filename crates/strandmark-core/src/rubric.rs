//! Rubric grading of free-form written work.
//!
//! The grader is a deterministic heuristic: keyword and concept matching,
//! table and graph structure checks, and a length bucket, combined with
//! fixed weights into a 0-8 achievement level.

use serde::{Deserialize, Serialize};

use crate::artifact::{parse_artifact, Artifact, DataTable, EmbeddedImage};
use crate::traits::{GraphKind, ImageClassification, ImageClassifier};

const KEYWORD_WEIGHT: f64 = 0.3;
const CONCEPT_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.2;
const STRUCTURE_WEIGHT: f64 = 0.1;
const IMAGE_WEIGHT: f64 = 0.1;

/// Points for each table element present.
const TABLE_ELEMENT_POINTS: u8 = 2;
const MIN_TABLE_ROWS: usize = 3;
const MAX_SUGGESTIONS: usize = 5;
const MIN_SUGGESTIONS: usize = 3;

/// One keyword or concept criterion tied to an achievement level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricEntry {
    pub label: String,
    pub level: u8,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl RubricEntry {
    fn matches(&self, text_lower: &str) -> bool {
        std::iter::once(&self.label)
            .chain(self.synonyms.iter())
            .map(|term| term.trim().to_lowercase())
            .any(|term| !term.is_empty() && text_lower.contains(&term))
    }
}

/// The rubric for one (learning path, strand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub path: String,
    pub strand: String,
    #[serde(default)]
    pub keywords: Vec<RubricEntry>,
    #[serde(default)]
    pub concepts: Vec<RubricEntry>,
    /// Strand-specific advice used when few gaps were found.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// A collection of rubrics, looked up by (path, strand).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RubricSet {
    #[serde(default)]
    pub rubrics: Vec<Rubric>,
}

impl RubricSet {
    pub fn find(&self, path: &str, strand: &str) -> Option<&Rubric> {
        self.rubrics
            .iter()
            .find(|r| r.path == path && r.strand == strand)
    }
}

/// The outcome of grading one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricEvaluation {
    pub final_level: u8,
    pub keyword_level: u8,
    pub concept_level: u8,
    pub structure_level: u8,
    pub image_level: u8,
    pub length_level: u8,
    pub word_count: usize,
    /// Labels of matched keyword entries, in rubric order.
    pub matched_keywords: Vec<String>,
    /// Labels of matched concept entries, in rubric order.
    pub matched_concepts: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Classifies images by sniffing their source, alt text and title for
/// marker words. Stands in for real image analysis behind the same contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadSniffClassifier;

const LINE_MARKERS: &[&str] = &["line graph", "line chart", "line plot", "linegraph"];
const GRAPH_MARKERS: &[&str] = &["bar", "histogram", "column chart", "graph", "chart", "plot"];
const AXIS_MARKERS: &[&str] = &["axis", "axes", "labelled", "labeled", "x-label", "y-label"];

impl ImageClassifier for PayloadSniffClassifier {
    fn classify(&self, image: &EmbeddedImage) -> ImageClassification {
        let payload = image.payload();
        let kind = if payload.contains("scatter") {
            GraphKind::Scatter
        } else if contains_any(&payload, LINE_MARKERS) {
            GraphKind::Line
        } else if contains_any(&payload, GRAPH_MARKERS) {
            GraphKind::Bar
        } else {
            GraphKind::Unrecognized
        };
        ImageClassification {
            kind,
            has_axis_labels: contains_any(&payload, AXIS_MARKERS),
            has_title: !image.title.trim().is_empty() || payload.contains("title"),
        }
    }
}

fn contains_any(payload: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| payload.contains(m))
}

/// Grades artifacts against rubrics.
pub struct RubricEvaluator {
    classifier: Box<dyn ImageClassifier>,
}

impl Default for RubricEvaluator {
    fn default() -> Self {
        Self::new(Box::new(PayloadSniffClassifier))
    }
}

impl RubricEvaluator {
    pub fn new(classifier: Box<dyn ImageClassifier>) -> Self {
        Self { classifier }
    }

    /// Grade a raw text or HTML artifact.
    pub fn evaluate(&self, raw: &str, rubric: &Rubric) -> RubricEvaluation {
        self.evaluate_artifact(&parse_artifact(raw), rubric)
    }

    pub fn evaluate_artifact(&self, artifact: &Artifact, rubric: &Rubric) -> RubricEvaluation {
        let lower = artifact.text.to_lowercase();
        let (keyword_level, matched_keywords) = entry_level(&rubric.keywords, &lower);
        let (concept_level, matched_concepts) = entry_level(&rubric.concepts, &lower);

        let mut structural = Vec::new();
        let structure_level = table_level(artifact.table.as_ref(), &mut structural);
        let image_level = match &artifact.image {
            Some(image) => graph_level(self.classifier.classify(image), &mut structural),
            None => {
                structural.push("Include a graph of your results.".to_string());
                0
            }
        };

        let word_count = artifact.word_count();
        let length_level = length_level(word_count);
        if let Some(target) = next_length_target(word_count) {
            structural.push(format!(
                "Expand your write-up to at least {target} words (currently {word_count})."
            ));
        }

        let weighted = KEYWORD_WEIGHT * f64::from(keyword_level)
            + CONCEPT_WEIGHT * f64::from(concept_level)
            + LENGTH_WEIGHT * f64::from(length_level)
            + STRUCTURE_WEIGHT * f64::from(structure_level)
            + IMAGE_WEIGHT * f64::from(image_level);
        let final_level = weighted.round().clamp(0.0, 8.0) as u8;

        let mut suggestions = structural;
        if let Some(entry) = next_unmatched(&rubric.keywords, keyword_level, &lower) {
            suggestions.push(format!(
                "Use the term '{}' to show a deeper understanding.",
                entry.label
            ));
        }
        if let Some(entry) = next_unmatched(&rubric.concepts, concept_level, &lower) {
            suggestions.push(format!("Explain the idea of {}.", entry.label));
        }
        for filler in &rubric.suggestions {
            if suggestions.len() >= MIN_SUGGESTIONS {
                break;
            }
            if !suggestions.contains(filler) {
                suggestions.push(filler.clone());
            }
        }
        suggestions.truncate(MAX_SUGGESTIONS);

        tracing::debug!(
            strand = %rubric.strand,
            final_level,
            keyword_level,
            concept_level,
            structure_level,
            image_level,
            length_level,
            "graded artifact"
        );

        RubricEvaluation {
            final_level,
            keyword_level,
            concept_level,
            structure_level,
            image_level,
            length_level,
            word_count,
            matched_keywords,
            matched_concepts,
            suggestions,
        }
    }
}

/// Highest level among matched entries, plus the matched labels.
fn entry_level(entries: &[RubricEntry], text_lower: &str) -> (u8, Vec<String>) {
    let matched: Vec<&RubricEntry> = entries.iter().filter(|e| e.matches(text_lower)).collect();
    let level = matched
        .iter()
        .map(|e| e.level.min(8))
        .max()
        .unwrap_or(0);
    (level, matched.iter().map(|e| e.label.clone()).collect())
}

/// The lowest-level unmatched entry above the level already reached.
fn next_unmatched<'a>(
    entries: &'a [RubricEntry],
    achieved: u8,
    text_lower: &str,
) -> Option<&'a RubricEntry> {
    entries
        .iter()
        .filter(|e| e.level > achieved && !e.matches(text_lower))
        .min_by_key(|e| e.level)
}

fn table_level(table: Option<&DataTable>, suggestions: &mut Vec<String>) -> u8 {
    let Some(table) = table else {
        suggestions.push("Add a data table to organise your measurements.".to_string());
        return 0;
    };
    let header_has = |needle: &str| {
        table
            .headers
            .iter()
            .any(|h| h.to_lowercase().contains(needle))
    };
    let has_units = table.headers.iter().any(|h| has_unit_marker(h));

    let mut points = 0;
    if table.rows.len() >= MIN_TABLE_ROWS {
        points += TABLE_ELEMENT_POINTS;
    } else {
        suggestions.push(format!(
            "Record at least {MIN_TABLE_ROWS} rows of data in your table."
        ));
    }
    if header_has("average") {
        points += TABLE_ELEMENT_POINTS;
    } else {
        suggestions.push("Add an 'Average' column to your table.".to_string());
    }
    if header_has("trial") {
        points += TABLE_ELEMENT_POINTS;
    } else {
        suggestions.push("Record repeated measurements as trials, e.g. 'Trial 1'.".to_string());
    }
    if has_units {
        points += TABLE_ELEMENT_POINTS;
    } else {
        suggestions.push("Include units in your table headers, e.g. 'Time (s)'.".to_string());
    }
    points
}

/// Headers mark units as `(...)` with something between the parentheses.
fn has_unit_marker(header: &str) -> bool {
    header
        .find('(')
        .and_then(|open| header[open + 1..].find(')').map(|close| close > 0))
        .unwrap_or(false)
}

fn graph_level(classification: ImageClassification, suggestions: &mut Vec<String>) -> u8 {
    let base = match classification.kind {
        GraphKind::Unrecognized => {
            suggestions.push(
                "The attached image was not recognised as a graph; upload a graph of your data."
                    .to_string(),
            );
            return 2;
        }
        GraphKind::Bar => 4,
        GraphKind::Line => 5,
        GraphKind::Scatter => 6,
    };
    let mut points = base;
    if classification.has_axis_labels {
        points += 1;
    } else {
        suggestions.push("Label both axes of your graph.".to_string());
    }
    if classification.has_title {
        points += 1;
    } else {
        suggestions.push("Give your graph a title.".to_string());
    }
    points.min(8)
}

/// `>=150 -> 8`, `>=100 -> 6`, `>=50 -> 4`, `>=20 -> 2`, else 0.
pub fn length_level(words: usize) -> u8 {
    if words >= 150 {
        8
    } else if words >= 100 {
        6
    } else if words >= 50 {
        4
    } else if words >= 20 {
        2
    } else {
        0
    }
}

fn next_length_target(words: usize) -> Option<usize> {
    [20, 50, 100, 150].into_iter().find(|&target| words < target)
}
