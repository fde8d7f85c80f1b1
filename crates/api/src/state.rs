//! Application state for the web server.

use std::sync::Arc;
use std::time::Instant;

use crewline_common::Result;
use crewline_crew::{Crew, SerperSearchTool, Tool};
use crewline_llm::{build_llm_client, LlmClient};

use crate::blog::blog_crew;
use crate::config::AppConfig;

/// Shared by all requests. Each request builds its own crew from it; only
/// the LLM client and the search tool are shared.
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub search: Arc<dyn Tool>,
    pub config: AppConfig,
    /// Server start time (for health checks)
    pub start_time: Instant,
}

impl AppState {
    /// Build clients from a config whose credentials are already resolved.
    pub fn new(config: AppConfig) -> Result<Self> {
        let llm = build_llm_client(&config.llm)?;
        let search: Arc<dyn Tool> = Arc::new(SerperSearchTool::new(&config.search)?);
        Ok(Self::with_clients(config, llm, search))
    }

    pub fn with_clients(config: AppConfig, llm: Arc<dyn LlmClient>, search: Arc<dyn Tool>) -> Self {
        Self {
            llm,
            search,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn blog_crew(&self) -> Result<Crew> {
        blog_crew(
            Arc::clone(&self.llm),
            Arc::clone(&self.search),
            &self.config.crew.output_file,
            self.config.crew_config(),
        )
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
