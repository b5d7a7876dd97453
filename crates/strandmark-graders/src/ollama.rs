//! Ollama (local LLM) grader.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use strandmark_core::traits::{
    render_grade_prompt, GradeRequest, GradeVerdict, ShortAnswerGrader, DEFAULT_GRADER_PROMPT,
};

use crate::error::{check_response, GraderError};
use crate::verdict::parse_verdict;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000; // Local models are slower

/// Grades short answers with a locally served model.
pub struct OllamaGrader {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGrader {
    pub fn new(base_url: &str, model: Option<String>) -> Result<Self, GraderError> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(|e| GraderError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl ShortAnswerGrader for OllamaGrader {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %self.model, question = %request.question_id))]
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
        let body = OllamaRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: DEFAULT_GRADER_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user",
                    content: render_grade_prompt(request),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraderError::Timeout(DEFAULT_TIMEOUT_MS)
                } else if e.is_connect() {
                    GraderError::NetworkError(format!(
                        "Ollama not reachable at {}. Is it running? Start with: ollama serve",
                        self.base_url
                    ))
                } else {
                    GraderError::NetworkError(e.to_string())
                }
            })?;

        let response = check_response(response, &self.model)
            .await
            .map_err(|e| match e {
                GraderError::ModelNotFound(model) => GraderError::ModelNotFound(format!(
                    "'{model}' is not available locally. Pull it with: ollama pull {model}"
                )),
                other => other,
            })?;

        let api_response: OllamaResponse =
            response.json().await.map_err(|e| GraderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let verdict = parse_verdict(&api_response.message.content)?;
        tracing::debug!(score = verdict.score, "ollama verdict");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strandmark_core::model::Level;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GradeRequest {
        GradeRequest {
            question_id: "m4-short".into(),
            prompt: "What happens to particles when ice melts?".into(),
            answer: "They gain energy and start to move past each other.".into(),
            level: Level::Four,
            required_keywords: vec![],
            required_concepts: vec!["particles".into()],
        }
    }

    #[tokio::test]
    async fn successful_grade() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "message": {"role": "assistant", "content": "{\"score\": 4, \"feedback\": \"Correct.\"}"},
            "model": DEFAULT_MODEL,
            "done": true
        });

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(
                serde_json::json!({"stream": false, "format": "json"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let grader = OllamaGrader::new(&server.uri(), None).unwrap();
        let verdict = grader.grade(&request()).await.unwrap();
        assert_eq!(verdict.score, 4);
        assert_eq!(verdict.feedback, "Correct.");
    }

    #[tokio::test]
    async fn model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'nonexistent' not found"})),
            )
            .mount(&server)
            .await;

        let grader = OllamaGrader::new(&server.uri(), Some("nonexistent".into())).unwrap();
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(err.to_string().contains("ollama pull nonexistent"));
    }

    #[tokio::test]
    async fn server_error_keeps_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"error": "out of memory"})),
            )
            .mount(&server)
            .await;

        let grader = OllamaGrader::new(&server.uri(), None).unwrap();
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GraderError>(),
            Some(GraderError::ApiError { status: 500, message }) if message == "out of memory"
        ));
    }
}
