use async_trait::async_trait;
use crewline_common::{CrewError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Retries transient failures with exponential backoff.
///
/// Only [`CrewError::LlmTransient`] is retried. Credential rejections and
/// malformed requests are returned on the first attempt. When the retry
/// budget runs out the last transient error is folded into
/// [`CrewError::LlmUnavailable`].
pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn compute_delay(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * rand_jitter(attempt)) as u64;
        let delay = (base as u64).saturating_add(jitter);
        delay.min(self.config.max_delay_ms)
    }
}

/// Simple deterministic jitter based on attempt number.
fn rand_jitter(attempt: u32) -> f64 {
    let x = attempt.wrapping_mul(2654435761);
    (x % 100) as f64 / 100.0
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;

        loop {
            let error = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let retry_after_ms = match &error {
                CrewError::LlmTransient { retry_after_ms, .. } => *retry_after_ms,
                _ => return Err(error),
            };

            if attempt == self.config.max_retries {
                return Err(CrewError::LlmUnavailable {
                    attempts: attempt + 1,
                    last_error: error.to_string(),
                });
            }

            let delay = retry_after_ms
                .map(|ms| ms.min(self.config.max_delay_ms))
                .unwrap_or_else(|| self.compute_delay(attempt));

            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay,
                error = %error,
                "Retrying LLM request"
            );

            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    fn ok_response() -> LlmResponse {
        LlmResponse {
            content: "ok".to_string(),
            model: "scripted".to_string(),
            usage: None,
            finish_reason: None,
        }
    }

    fn rate_limited() -> CrewError {
        CrewError::LlmTransient {
            status: Some(429),
            message: "rate limit".to_string(),
            retry_after_ms: None,
        }
    }

    /// Pops one scripted outcome per call; answers "ok" once the script is empty.
    struct ScriptedClient {
        script: Mutex<Vec<Result<LlmResponse>>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(mut script: Vec<Result<LlmResponse>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop().unwrap_or_else(|| Ok(ok_response()))
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn compute_delay_grows_and_respects_max() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![]),
            RetryConfig {
                max_retries: 5,
                initial_delay_ms: 500,
                max_delay_ms: 2000,
                backoff_multiplier: 10.0,
            },
        );
        assert!(client.compute_delay(0) >= 500);
        assert!(client.compute_delay(0) < 2000);
        assert_eq!(client.compute_delay(5), 2000);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(rate_limited()), Err(rate_limited())]),
            fast_config(3),
        );
        let response = client.complete(LlmRequest::default()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_becomes_unavailable() {
        let client = RetryingClient::new(
            ScriptedClient::new((0..10).map(|_| Err(rate_limited())).collect()),
            fast_config(2),
        );
        let err = client.complete(LlmRequest::default()).await.unwrap_err();
        match err {
            CrewError::LlmUnavailable { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("rate limit"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(CrewError::LlmAuth("401".to_string()))]),
            fast_config(3),
        );
        let err = client.complete(LlmRequest::default()).await.unwrap_err();
        assert!(matches!(err, CrewError::LlmAuth(_)));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_after_is_capped_by_max_delay() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(CrewError::LlmTransient {
                status: Some(429),
                message: "slow down".to_string(),
                retry_after_ms: Some(60_000),
            })]),
            fast_config(1),
        );
        let started = std::time::Instant::now();
        client.complete(LlmRequest::default()).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
