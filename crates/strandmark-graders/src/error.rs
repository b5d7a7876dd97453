//! HTTP failure classification shared by the network graders.

use serde::Deserialize;

pub use strandmark_core::error::GraderError;

/// Retry hint used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    /// `{"error": {"message": "..."}}`
    Nested { error: NestedError },
    /// `{"error": "..."}`
    Flat { error: String },
}

#[derive(Deserialize)]
struct NestedError {
    message: String,
}

fn error_message(body: String) -> String {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Err(_) => body,
    }
}

/// Map a non-success response to a [`GraderError`]; pass successes through.
pub(crate) async fn check_response(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, GraderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
            * 1000;
        return Err(GraderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        401 | 403 => GraderError::AuthenticationFailed(error_message(body)),
        404 => GraderError::ModelNotFound(model.to_string()),
        _ => GraderError::ApiError {
            status,
            message: error_message(body),
        },
    })
}

/// Map a transport failure.
pub(crate) fn send_error(e: reqwest::Error, timeout_ms: u64) -> GraderError {
    if e.is_timeout() {
        GraderError::Timeout(timeout_ms)
    } else {
        GraderError::NetworkError(e.to_string())
    }
}
