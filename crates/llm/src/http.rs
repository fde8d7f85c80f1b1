//! Mapping of provider HTTP failures onto the crewline error taxonomy.

use crewline_common::{CrewError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> CrewError {
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("{provider} API error {status}: {body}");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrewError::LlmAuth(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => CrewError::LlmTransient {
            status: Some(status.as_u16()),
            message,
            retry_after_ms: retry_after_ms(headers),
        },
        s if s.is_server_error() => CrewError::LlmTransient {
            status: Some(s.as_u16()),
            message,
            retry_after_ms: retry_after_ms(headers),
        },
        _ => CrewError::LlmRequest(message),
    }
}

pub(crate) fn classify_transport(provider: &str, error: reqwest::Error) -> CrewError {
    if error.is_decode() {
        return CrewError::LlmRequest(format!("Failed to parse {provider} response: {error}"));
    }
    // Connect failures, resets and timeouts are all worth another attempt.
    CrewError::LlmTransient {
        status: error.status().map(|s| s.as_u16()),
        message: format!("{provider} request failed: {error}"),
        retry_after_ms: None,
    }
}

/// Decode a successful provider response, or classify the failure.
pub(crate) async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &headers, &body));
    }
    response
        .json()
        .await
        .map_err(|e| classify_transport(provider, e))
}

/// `Retry-After` in delta-seconds form, converted to milliseconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}
