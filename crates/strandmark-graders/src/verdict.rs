//! Parsing grader replies into verdicts.

use serde::Deserialize;

use strandmark_core::traits::{extract_json_object, GradeVerdict};

use crate::error::GraderError;

#[derive(Deserialize)]
struct RawVerdict {
    score: f64,
    #[serde(default)]
    feedback: String,
}

/// Parse the JSON verdict out of a model's reply text.
///
/// Fractional scores are rounded. The evaluator clamps to the question level.
pub fn parse_verdict(reply: &str) -> Result<GradeVerdict, GraderError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| GraderError::InvalidVerdict("no JSON object in reply".into()))?;
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| GraderError::InvalidVerdict(format!("malformed verdict: {e}")))?;
    if !raw.score.is_finite() || raw.score < 0.0 {
        return Err(GraderError::InvalidVerdict(format!(
            "score {} is not a non-negative number",
            raw.score
        )));
    }
    Ok(GradeVerdict {
        score: raw.score.round().min(f64::from(u8::MAX)) as u8,
        feedback: raw.feedback.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_verdict() {
        let verdict =
            parse_verdict("```json\n{\"score\": 5, \"feedback\": \" Clear answer. \"}\n```")
                .unwrap();
        assert_eq!(verdict.score, 5);
        assert_eq!(verdict.feedback, "Clear answer.");
    }

    #[test]
    fn rounds_fractional_scores() {
        assert_eq!(parse_verdict(r#"{"score": 3.6}"#).unwrap().score, 4);
    }

    #[test]
    fn rejects_missing_or_negative_scores() {
        assert!(matches!(
            parse_verdict("Looks good to me!"),
            Err(GraderError::InvalidVerdict(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"feedback": "no score"}"#),
            Err(GraderError::InvalidVerdict(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"score": -1}"#),
            Err(GraderError::InvalidVerdict(_))
        ));
    }
}
