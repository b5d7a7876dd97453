//! Per-question-type scoring.
//!
//! Every function here returns a well-formed [`QuestionResponse`]. Malformed
//! questions and mismatched answer payloads produce a zero-score response
//! with a diagnostic feedback string instead of an error, so the block
//! machine always has something to record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GraderError, ValidationError};
use crate::model::{Answer, GradedBy, MatchPair, Question, QuestionKind, QuestionResponse};
use crate::traits::{GradeRequest, ShortAnswerGrader};

/// Default time an external grader gets before the local heuristic is used.
pub const DEFAULT_GRADER_TIMEOUT: Duration = Duration::from_secs(8);

/// Scores answers, optionally consulting an external short-answer grader.
#[derive(Clone)]
pub struct Evaluator {
    grader: Option<Arc<dyn ShortAnswerGrader>>,
    grader_timeout: Duration,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::local()
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("grader", &self.grader.as_ref().map(|g| g.name().to_string()))
            .field("grader_timeout", &self.grader_timeout)
            .finish()
    }
}

impl Evaluator {
    /// An evaluator that only uses the built-in rules.
    pub fn local() -> Self {
        Self {
            grader: None,
            grader_timeout: DEFAULT_GRADER_TIMEOUT,
        }
    }

    pub fn with_grader(grader: Arc<dyn ShortAnswerGrader>, timeout: Duration) -> Self {
        Self {
            grader: Some(grader),
            grader_timeout: timeout,
        }
    }

    /// Score one submission. Dispatches on the question kind.
    pub async fn evaluate(&self, question: &Question, answer: Answer) -> QuestionResponse {
        match (&question.kind, answer) {
            (QuestionKind::Mcq { .. }, Answer::Choice(selected)) => {
                evaluate_mcq(question, &selected)
            }
            (QuestionKind::FillBlank { .. }, Answer::Blanks(answers)) => {
                evaluate_fill_blank(question, &answers)
            }
            (QuestionKind::MatchClick { .. }, Answer::Matches(matches)) => {
                evaluate_match_click(question, &matches)
            }
            (QuestionKind::ShortAnswer { .. }, Answer::Text(text)) => {
                evaluate_short_answer(
                    question,
                    &text,
                    self.grader.as_deref(),
                    self.grader_timeout,
                )
                .await
            }
            (kind, answer) => {
                let err = ValidationError::AnswerMismatch {
                    question: kind_label(kind),
                    answer: answer.kind_name(),
                };
                tracing::debug!(question = %question.id, "rejecting answer: {err}");
                QuestionResponse::rejected(question, answer, err.to_string())
            }
        }
    }
}

fn kind_label(kind: &QuestionKind) -> &'static str {
    match kind {
        QuestionKind::Mcq { .. } => "multiple-choice",
        QuestionKind::FillBlank { .. } => "fill-in-the-blank",
        QuestionKind::MatchClick { .. } => "match",
        QuestionKind::ShortAnswer { .. } => "short-answer",
    }
}

fn malformed(question: &Question, answer: Answer, err: &ValidationError) -> QuestionResponse {
    tracing::warn!(question = %question.id, "malformed question: {err}");
    QuestionResponse::rejected(
        question,
        answer,
        format!("This question could not be scored ({err})."),
    )
}

/// Score a percentage-based answer on the question's level.
///
/// `>=90% -> L`, `>=70% -> L-1`, `>=50% -> L-2`, `>=30% -> L-3`, else 0.
/// Compares the exact ratio `correct / total` so breakpoints are not
/// subject to float rounding.
pub fn bucket_score(level: u8, correct: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let at_least = |percent: usize| correct * 100 >= total * percent;
    if at_least(90) {
        level
    } else if at_least(70) {
        level.saturating_sub(1)
    } else if at_least(50) {
        level.saturating_sub(2)
    } else if at_least(30) {
        level.saturating_sub(3)
    } else {
        0
    }
}

/// Percentage-based answers count as correct from 70% up.
fn passes(correct: usize, total: usize) -> bool {
    total > 0 && correct * 10 >= total * 7
}

fn partial_feedback(correct: usize, total: usize, score: u8, max: u8, noun: &str) -> String {
    if correct == total {
        format!("All {total} {noun} correct. {score}/{max} points.")
    } else {
        format!("{correct} of {total} {noun} correct. {score}/{max} points.")
    }
}

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ---------------------------------------------------------------------------
// Multiple choice
// ---------------------------------------------------------------------------

pub fn evaluate_mcq(question: &Question, selected_option_id: &str) -> QuestionResponse {
    let answer = Answer::Choice(selected_option_id.to_string());
    let QuestionKind::Mcq { options } = &question.kind else {
        return mismatched(question, answer);
    };
    if let Err(err) = question.validate() {
        return malformed(question, answer, &err);
    }

    let level = question.level.points();
    let Some(option) = options.iter().find(|o| o.id == selected_option_id) else {
        return QuestionResponse::rejected(
            question,
            answer,
            format!("Option '{selected_option_id}' is not one of the choices."),
        );
    };

    if option.is_correct {
        return QuestionResponse::new(
            question,
            answer,
            level,
            true,
            format!("Correct! {level}/{level} points."),
            GradedBy::Local,
        );
    }

    let score = option.level.unwrap_or(0).min(level);
    let feedback = if score > 0 {
        format!("Not quite, but partly right. {score}/{level} points.")
    } else {
        format!("Not quite. 0/{level} points.")
    };
    QuestionResponse::new(question, answer, score, false, feedback, GradedBy::Local)
}

fn mismatched(question: &Question, answer: Answer) -> QuestionResponse {
    let err = ValidationError::AnswerMismatch {
        question: kind_label(&question.kind),
        answer: answer.kind_name(),
    };
    QuestionResponse::rejected(question, answer, err.to_string())
}

// ---------------------------------------------------------------------------
// Fill in the blank
// ---------------------------------------------------------------------------

pub fn evaluate_fill_blank(question: &Question, answers: &[String]) -> QuestionResponse {
    let answer = Answer::Blanks(answers.to_vec());
    let QuestionKind::FillBlank { blanks, .. } = &question.kind else {
        return mismatched(question, answer);
    };
    if let Err(err) = question.validate() {
        return malformed(question, answer, &err);
    }

    let correct = blanks
        .iter()
        .enumerate()
        .filter(|(i, blank)| {
            let Some(given) = answers.get(*i) else {
                return false;
            };
            let given = given.trim();
            blank.accepted.iter().any(|accepted| {
                let accepted = accepted.trim();
                if blank.case_sensitive {
                    accepted == given
                } else {
                    accepted.to_lowercase() == given.to_lowercase()
                }
            })
        })
        .count();
    let total = blanks.len();
    let level = question.level.points();
    let score = bucket_score(level, correct, total);

    QuestionResponse::new(
        question,
        answer,
        score,
        passes(correct, total),
        partial_feedback(correct, total, score, level, "blanks"),
        GradedBy::Local,
    )
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

pub fn evaluate_match_click(question: &Question, matches: &[MatchPair]) -> QuestionResponse {
    let answer = Answer::Matches(matches.to_vec());
    let QuestionKind::MatchClick { pairs, .. } = &question.kind else {
        return mismatched(question, answer);
    };
    if let Err(err) = question.validate() {
        return malformed(question, answer, &err);
    }

    let canonical: HashSet<&MatchPair> = pairs.iter().collect();
    let submitted: HashSet<&MatchPair> = matches.iter().collect();
    // A side paired more than once forfeits credit for all of its pairs.
    let mut uses: HashMap<(bool, &str), usize> = HashMap::new();
    for pair in &submitted {
        *uses.entry((true, pair.left.as_str())).or_default() += 1;
        *uses.entry((false, pair.right.as_str())).or_default() += 1;
    }
    let correct = submitted
        .intersection(&canonical)
        .filter(|pair| {
            uses[&(true, pair.left.as_str())] == 1 && uses[&(false, pair.right.as_str())] == 1
        })
        .count();
    let total = canonical.len();
    let level = question.level.points();
    let score = bucket_score(level, correct, total);

    QuestionResponse::new(
        question,
        answer,
        score,
        passes(correct, total),
        partial_feedback(correct, total, score, level, "matches"),
        GradedBy::Local,
    )
}

// ---------------------------------------------------------------------------
// Short answer
// ---------------------------------------------------------------------------

/// Fraction of `required` terms present in `text` (case-insensitive
/// substring). An empty requirement list counts as full coverage.
pub fn coverage(text_lower: &str, required: &[String]) -> (f64, Vec<String>) {
    if required.is_empty() {
        return (1.0, Vec::new());
    }
    let matched: Vec<String> = required
        .iter()
        .filter(|term| {
            let term = term.trim().to_lowercase();
            !term.is_empty() && text_lower.contains(&term)
        })
        .cloned()
        .collect();
    (matched.len() as f64 / required.len() as f64, matched)
}

/// A short answer passes at `max(level - 2, 4)` points.
pub fn short_answer_passes(level: u8, score: u8) -> bool {
    score >= level.saturating_sub(2).max(4)
}

struct ShortAnswerLimits<'a> {
    min_words: Option<usize>,
    max_words: Option<usize>,
    keywords: &'a [String],
    concepts: &'a [String],
}

fn short_answer_limits(question: &Question) -> Option<ShortAnswerLimits<'_>> {
    match &question.kind {
        QuestionKind::ShortAnswer {
            min_words,
            max_words,
            required_keywords,
            required_concepts,
        } => Some(ShortAnswerLimits {
            min_words: *min_words,
            max_words: *max_words,
            keywords: required_keywords,
            concepts: required_concepts,
        }),
        _ => None,
    }
}

fn cap_for_length(level: u8, score: u8, words: usize, max_words: Option<usize>) -> (u8, bool) {
    match max_words {
        Some(max) if words > max => (score.min(level.saturating_sub(2)), true),
        _ => (score, false),
    }
}

/// Score a short answer with the local keyword/concept heuristic.
pub fn score_short_answer_locally(question: &Question, text: &str) -> QuestionResponse {
    local_short_answer(question, text, GradedBy::Local)
}

fn local_short_answer(question: &Question, text: &str, graded_by: GradedBy) -> QuestionResponse {
    let answer = Answer::Text(text.to_string());
    let Some(limits) = short_answer_limits(question) else {
        return mismatched(question, answer);
    };
    if let Err(err) = question.validate() {
        return malformed(question, answer, &err);
    }

    let words = word_count(text);
    if let Some(min) = limits.min_words {
        if words < min {
            return QuestionResponse::rejected(
                question,
                answer,
                format!("Your answer has {words} words; at least {min} are needed."),
            );
        }
    }

    let level = question.level.points();
    let lower = text.to_lowercase();
    let (keyword_coverage, matched_keywords) = coverage(&lower, limits.keywords);
    let (concept_coverage, _) = coverage(&lower, limits.concepts);
    let raw = (f64::from(level) * (0.6 * keyword_coverage + 0.4 * concept_coverage)).round();
    let (score, capped) = cap_for_length(level, raw as u8, words, limits.max_words);
    let is_correct = short_answer_passes(level, score);

    let mut feedback = format!("{score}/{level} points.");
    if capped {
        feedback.push_str(" Try to keep your answer more concise.");
    }
    let missing: Vec<&String> = limits
        .keywords
        .iter()
        .filter(|k| !matched_keywords.contains(k))
        .collect();
    if !missing.is_empty() && !is_correct {
        feedback.push_str(&format!(
            " Consider using: {}.",
            missing
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    QuestionResponse::new(question, answer, score, is_correct, feedback, graded_by)
}

/// Score a short answer, consulting `grader` under `timeout` when given.
///
/// Answers below the minimum word count are rejected before any grader is
/// called. Grader errors and timeouts fall back to the local heuristic.
pub async fn evaluate_short_answer(
    question: &Question,
    text: &str,
    grader: Option<&dyn ShortAnswerGrader>,
    timeout: Duration,
) -> QuestionResponse {
    let Some(grader) = grader else {
        return score_short_answer_locally(question, text);
    };
    let Some(limits) = short_answer_limits(question) else {
        return mismatched(question, Answer::Text(text.to_string()));
    };
    let words = word_count(text);
    if question.validate().is_err() || limits.min_words.is_some_and(|min| words < min) {
        return score_short_answer_locally(question, text);
    }

    let request = GradeRequest {
        question_id: question.id.clone(),
        prompt: question.prompt.clone(),
        answer: text.to_string(),
        level: question.level,
        required_keywords: limits.keywords.to_vec(),
        required_concepts: limits.concepts.to_vec(),
    };

    match tokio::time::timeout(timeout, grader.grade(&request)).await {
        Ok(Ok(verdict)) => {
            let level = question.level.points();
            let (score, capped) =
                cap_for_length(level, verdict.score.min(level), words, limits.max_words);
            let is_correct = short_answer_passes(level, score);
            let mut feedback = if verdict.feedback.trim().is_empty() {
                format!("{score}/{level} points.")
            } else {
                format!("{} {score}/{level} points.", verdict.feedback.trim())
            };
            if capped {
                feedback.push_str(" Try to keep your answer more concise.");
            }
            QuestionResponse::new(
                question,
                Answer::Text(text.to_string()),
                score,
                is_correct,
                feedback,
                GradedBy::External(grader.name().to_string()),
            )
        }
        Ok(Err(e)) => {
            let permanent = e
                .downcast_ref::<GraderError>()
                .is_some_and(GraderError::is_permanent);
            tracing::warn!(
                question = %question.id,
                grader = grader.name(),
                permanent,
                "grader failed, using local scoring: {e:#}"
            );
            local_short_answer(question, text, GradedBy::Fallback)
        }
        Err(_) => {
            tracing::warn!(
                question = %question.id,
                grader = grader.name(),
                "grader timed out after {}ms, using local scoring",
                timeout.as_millis()
            );
            local_short_answer(question, text, GradedBy::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Blank, Level, McqOption};
    use crate::traits::GradeVerdict;
    use async_trait::async_trait;

    fn question(level: Level, kind: QuestionKind) -> Question {
        Question {
            id: "q".into(),
            level,
            points: 1,
            prompt: "prompt".into(),
            strand: "energy".into(),
            concept: "conservation".into(),
            keywords: vec!["energy".into()],
            kind,
        }
    }

    fn option(id: &str, is_correct: bool, level: Option<u8>) -> McqOption {
        McqOption {
            id: id.into(),
            text: id.into(),
            is_correct,
            level,
        }
    }

    fn sample_mcq() -> Question {
        question(
            Level::Eight,
            QuestionKind::Mcq {
                options: vec![
                    option("a", true, None),
                    option("b", false, Some(4)),
                    option("c", false, None),
                    option("d", false, None),
                ],
            },
        )
    }

    fn fill_blank(count: usize) -> Question {
        question(
            Level::Eight,
            QuestionKind::FillBlank {
                template: "blanks".into(),
                blanks: (0..count)
                    .map(|i| Blank {
                        accepted: vec![format!("ans{i}")],
                        case_sensitive: false,
                        hints: vec![],
                    })
                    .collect(),
            },
        )
    }

    fn match_question(n: usize) -> Question {
        question(
            Level::Six,
            QuestionKind::MatchClick {
                left: (0..n).map(|i| format!("l{i}")).collect(),
                right: (0..n).map(|i| format!("r{i}")).collect(),
                pairs: (0..n)
                    .map(|i| MatchPair::new(format!("l{i}"), format!("r{i}")))
                    .collect(),
            },
        )
    }

    fn short_answer(min: Option<usize>, max: Option<usize>) -> Question {
        question(
            Level::Eight,
            QuestionKind::ShortAnswer {
                min_words: min,
                max_words: max,
                required_keywords: vec!["friction".into(), "heat".into()],
                required_concepts: vec!["energy transfer".into()],
            },
        )
    }

    #[test]
    fn mcq_correct_scores_level() {
        let r = evaluate_mcq(&sample_mcq(), "a");
        assert!(r.is_correct);
        assert_eq!(r.score, 8);
    }

    #[test]
    fn mcq_partial_credit_option() {
        let r = evaluate_mcq(&sample_mcq(), "b");
        assert!(!r.is_correct);
        assert_eq!(r.score, 4);
    }

    #[test]
    fn mcq_plain_wrong_option_scores_zero() {
        let r = evaluate_mcq(&sample_mcq(), "c");
        assert!(!r.is_correct);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn mcq_unknown_option_is_diagnosed() {
        let r = evaluate_mcq(&sample_mcq(), "zz");
        assert_eq!(r.score, 0);
        assert!(!r.is_correct);
        assert!(r.feedback.contains("'zz'"));
    }

    #[test]
    fn mcq_with_two_correct_options_is_malformed() {
        let q = question(
            Level::Four,
            QuestionKind::Mcq {
                options: vec![option("a", true, None), option("b", true, None)],
            },
        );
        let r = evaluate_mcq(&q, "a");
        assert_eq!(r.score, 0);
        assert!(!r.is_correct);
        assert!(r.feedback.contains("could not be scored"));
    }

    #[test]
    fn bucket_breakpoints_are_exact() {
        assert_eq!(bucket_score(8, 9, 10), 8);
        assert_eq!(bucket_score(8, 89, 100), 7);
        assert_eq!(bucket_score(8, 7, 10), 7);
        assert_eq!(bucket_score(8, 69, 100), 6);
        assert_eq!(bucket_score(8, 5, 10), 6);
        assert_eq!(bucket_score(8, 49, 100), 5);
        assert_eq!(bucket_score(8, 3, 10), 5);
        assert_eq!(bucket_score(8, 29, 100), 0);
        assert_eq!(bucket_score(2, 3, 10), 0);
        assert_eq!(bucket_score(8, 0, 0), 0);
    }

    #[test]
    fn bucket_is_non_decreasing() {
        for level in [2u8, 4, 6, 8] {
            let mut previous = 0;
            for correct in 0..=100 {
                let score = bucket_score(level, correct, 100);
                assert!(score >= previous, "level {level} at {correct}%");
                previous = score;
            }
        }
    }

    #[test]
    fn fill_blank_half_correct() {
        let r = evaluate_fill_blank(&fill_blank(2), &["ans0".into(), "wrong".into()]);
        assert_eq!(r.score, 6);
        assert!(!r.is_correct);
    }

    #[test]
    fn fill_blank_trims_and_ignores_case() {
        let r = evaluate_fill_blank(&fill_blank(2), &["  ANS0 ".into(), "Ans1".into()]);
        assert_eq!(r.score, 8);
        assert!(r.is_correct);
    }

    #[test]
    fn fill_blank_case_sensitive_blank() {
        let q = question(
            Level::Four,
            QuestionKind::FillBlank {
                template: "{0}".into(),
                blanks: vec![Blank {
                    accepted: vec!["NaCl".into()],
                    case_sensitive: true,
                    hints: vec![],
                }],
            },
        );
        assert_eq!(evaluate_fill_blank(&q, &["nacl".into()]).score, 0);
        assert_eq!(evaluate_fill_blank(&q, &["NaCl".into()]).score, 4);
    }

    #[test]
    fn fill_blank_missing_answers_count_as_wrong() {
        let r = evaluate_fill_blank(&fill_blank(4), &["ans0".into()]);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn fill_blank_seventy_percent_is_correct() {
        let answers: Vec<String> = (0..10)
            .map(|i| if i < 7 { format!("ans{i}") } else { "x".into() })
            .collect();
        let r = evaluate_fill_blank(&fill_blank(10), &answers);
        assert_eq!(r.score, 7);
        assert!(r.is_correct);
    }

    #[test]
    fn match_order_is_irrelevant() {
        let q = match_question(4);
        let forward: Vec<MatchPair> = (0..4)
            .map(|i| MatchPair::new(format!("l{i}"), format!("r{i}")))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        let a = evaluate_match_click(&q, &forward);
        let b = evaluate_match_click(&q, &reversed);
        assert_eq!(a.score, b.score);
        assert_eq!(a.score, 6);
        assert!(a.is_correct);
    }

    #[test]
    fn match_duplicates_count_once() {
        let q = match_question(2);
        let r = evaluate_match_click(
            &q,
            &[MatchPair::new("l0", "r0"), MatchPair::new("l0", "r0")],
        );
        assert_eq!(r.score, 4);
        assert!(!r.is_correct);
    }

    #[test]
    fn match_cross_product_earns_nothing() {
        let q = match_question(4);
        let every_pair: Vec<MatchPair> = (0..4)
            .flat_map(|l| (0..4).map(move |r| MatchPair::new(format!("l{l}"), format!("r{r}"))))
            .collect();
        assert_eq!(every_pair.len(), 16);
        let r = evaluate_match_click(&q, &every_pair);
        assert_eq!(r.score, 0);
        assert!(!r.is_correct);
    }

    #[test]
    fn match_reused_item_loses_only_its_pairs() {
        let q = match_question(4);
        let mut submitted: Vec<MatchPair> = (0..4)
            .map(|i| MatchPair::new(format!("l{i}"), format!("r{i}")))
            .collect();
        submitted.push(MatchPair::new("l0", "r1"));
        let mut shuffled = submitted.clone();
        shuffled.rotate_left(2);

        let a = evaluate_match_click(&q, &submitted);
        let b = evaluate_match_click(&q, &shuffled);
        // l0 and r1 are both used twice, leaving l2-r2 and l3-r3.
        assert_eq!(a.score, 4);
        assert_eq!(a.score, b.score);
        assert!(!a.is_correct);
    }

    #[test]
    fn short_answer_below_min_words_scores_zero() {
        let q = short_answer(Some(15), None);
        let text = "friction makes heat through energy transfer in every single case";
        assert_eq!(word_count(text), 10);
        let r = score_short_answer_locally(&q, text);
        assert_eq!(r.score, 0);
        assert!(!r.is_correct);
    }

    #[test]
    fn short_answer_full_coverage() {
        let q = short_answer(None, None);
        let r = score_short_answer_locally(&q, "Friction produces HEAT, an energy transfer.");
        assert_eq!(r.score, 8);
        assert!(r.is_correct);
    }

    #[test]
    fn short_answer_partial_coverage() {
        let q = short_answer(None, None);
        // keywords 1/2, concepts 0/1: round(8 * 0.3) = 2
        let r = score_short_answer_locally(&q, "friction is involved");
        assert_eq!(r.score, 2);
        assert!(!r.is_correct);
        assert!(r.feedback.contains("heat"));
    }

    #[test]
    fn short_answer_over_max_words_is_capped() {
        let q = short_answer(None, Some(5));
        let r = score_short_answer_locally(
            &q,
            "friction produces heat because of energy transfer between surfaces",
        );
        assert_eq!(r.score, 6);
        assert!(r.is_correct);
    }

    #[test]
    fn short_answer_pass_threshold() {
        assert!(short_answer_passes(8, 6));
        assert!(!short_answer_passes(8, 5));
        assert!(short_answer_passes(4, 4));
        assert!(!short_answer_passes(4, 3));
        assert!(!short_answer_passes(2, 2));
    }

    struct FixedGrader(u8);

    #[async_trait]
    impl ShortAnswerGrader for FixedGrader {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn grade(&self, _request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
            Ok(GradeVerdict {
                score: self.0,
                feedback: "Nice reasoning.".into(),
            })
        }
    }

    struct FailingGrader;

    #[async_trait]
    impl ShortAnswerGrader for FailingGrader {
        fn name(&self) -> &str {
            "failing"
        }

        async fn grade(&self, _request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
            Err(crate::error::GraderError::NetworkError("connection refused".into()).into())
        }
    }

    struct SlowGrader;

    #[async_trait]
    impl ShortAnswerGrader for SlowGrader {
        fn name(&self) -> &str {
            "slow"
        }

        async fn grade(&self, _request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GradeVerdict {
                score: 8,
                feedback: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn external_grader_score_is_clamped() {
        let q = short_answer(None, None);
        let r = evaluate_short_answer(
            &q,
            "anything at all",
            Some(&FixedGrader(12)),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(r.score, 8);
        assert!(r.is_correct);
        assert_eq!(r.graded_by, GradedBy::External("fixed".into()));
        assert!(r.feedback.starts_with("Nice reasoning."));
    }

    #[tokio::test]
    async fn failing_grader_falls_back_to_local() {
        let q = short_answer(None, None);
        let r = evaluate_short_answer(
            &q,
            "friction makes heat by energy transfer",
            Some(&FailingGrader),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(r.graded_by, GradedBy::Fallback);
        assert_eq!(r.score, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_grader_times_out_to_local() {
        let q = short_answer(None, None);
        let r = evaluate_short_answer(
            &q,
            "friction",
            Some(&SlowGrader),
            Duration::from_millis(500),
        )
        .await;
        assert_eq!(r.graded_by, GradedBy::Fallback);
        assert_eq!(r.score, 2);
    }

    #[tokio::test]
    async fn grader_not_called_below_min_words() {
        let q = short_answer(Some(5), None);
        let r = evaluate_short_answer(&q, "too short", Some(&FixedGrader(8)), Duration::from_secs(1))
            .await;
        assert_eq!(r.score, 0);
        assert_eq!(r.graded_by, GradedBy::Local);
    }

    #[tokio::test]
    async fn mismatched_answer_is_rejected() {
        let evaluator = Evaluator::local();
        let r = evaluator
            .evaluate(&sample_mcq(), Answer::Text("a".into()))
            .await;
        assert_eq!(r.score, 0);
        assert!(!r.is_correct);
        assert!(r.feedback.contains("does not fit"));
    }

    #[tokio::test]
    async fn evaluate_dispatches_by_kind() {
        let evaluator = Evaluator::local();
        let r = evaluator
            .evaluate(&sample_mcq(), Answer::Choice("a".into()))
            .await;
        assert_eq!(r.score, 8);
        let r = evaluator
            .evaluate(
                &match_question(2),
                Answer::Matches(vec![MatchPair::new("l1", "r1"), MatchPair::new("l0", "r0")]),
            )
            .await;
        assert_eq!(r.score, 6);
    }
}
