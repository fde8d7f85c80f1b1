//! Process-wide cap on in-flight LLM requests.

use std::sync::Arc;

use async_trait::async_trait;
use crewline_common::{CrewError, Result};
use tokio::sync::Semaphore;
use tracing::trace;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Gates every call on a shared semaphore. Concurrent crew runs that share
/// one client share one budget.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    permits: Arc<Semaphore>,
}

impl SemaphoredClient {
    /// A limit of zero is raised to one.
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CrewError::LlmRequest("LLM request limiter closed".into()))?;
        trace!(available = self.permits.available_permits(), "LLM permit acquired");
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
