//! Anthropic Messages API grader.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use strandmark_core::traits::{
    render_grade_prompt, GradeRequest, GradeVerdict, ShortAnswerGrader, DEFAULT_GRADER_PROMPT,
};

use crate::error::{check_response, send_error, GraderError};
use crate::verdict::parse_verdict;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_TOKENS: u32 = 300;

/// Grades short answers with an Anthropic model.
pub struct AnthropicGrader {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicGrader {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, GraderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(|e| GraderError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl ShortAnswerGrader for AnthropicGrader {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %self.model, question = %request.question_id))]
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeVerdict> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: DEFAULT_GRADER_PROMPT,
            messages: vec![AnthropicMessage {
                role: "user",
                content: render_grade_prompt(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_MS))?;
        let response = check_response(response, &self.model).await?;

        let api_response: AnthropicResponse =
            response.json().await.map_err(|e| GraderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let text: String = api_response
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        let verdict = parse_verdict(&text)?;
        tracing::debug!(score = verdict.score, "anthropic verdict");
        Ok(verdict)
    }
}
