//! crewline server binary.
//!
//! Usage:
//!   crewline
//!   crewline --config crewline.toml
//!   crewline --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - LLM credential (or `ANTHROPIC_API_KEY` for the anthropic provider)
//! - `SERPER_API_KEY` - Web search credential
//! - `CREWLINE_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `RUST_LOG` - Log filter
//!
//! A `.env` file in the working directory is loaded when present.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use crewline_api::{serve, AppConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "crewline", version, about = "Research a topic and write a blog post about it")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "CREWLINE_BIND_ADDR", default_value = "127.0.0.1")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crewline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "Loading configuration");
        AppConfig::from_file(path)?
    } else {
        tracing::info!("Using default configuration");
        AppConfig::default()
    };

    // Missing credentials abort startup rather than the first request.
    config.resolve_credentials_with(|name| std::env::var(name).ok())?;

    if cli.bind == "0.0.0.0" {
        tracing::warn!("Server binding to 0.0.0.0; the form is reachable from every network interface.");
    }

    tracing::info!(
        provider = %config.llm.provider,
        model = config.llm.model_or_default(),
        output_file = %config.crew.output_file.display(),
        "Configuration resolved"
    );

    let state = AppState::new(config)?;
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
