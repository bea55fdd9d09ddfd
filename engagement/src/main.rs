//! Engagement hub server
//!
//! Starts the event hub, the tracker/dispatcher/arbiter loops and the
//! WebSocket + HTTP surface in one process.
//!
//! # Usage
//!
//! ```bash
//! engagement --listen 0.0.0.0:8080
//! RUST_LOG=engagement=debug engagement --config engagement.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engagement::gateway::{self, AppState};
use engagement::{
    ConfigOverrides, EngagementConfig, EventHub, HttpDefenseClient, Orchestrator, OrchestratorParts,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides bus.listen / ENGAGEMENT_LISTEN)
    #[arg(long)]
    listen: Option<String>,

    /// Campaign timeout in seconds (overrides ENGAGEMENT_CAMPAIGN_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Require all six defense actions before a verdict
    #[arg(long, default_value_t = false)]
    strict_defense: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let overrides = ConfigOverrides {
        listen: args.listen,
        campaign_timeout_secs: args.timeout_secs,
        require_all_defense_actions: args.strict_defense.then_some(true),
        ..Default::default()
    };
    let config = EngagementConfig::resolve(args.config.as_deref(), &overrides)
        .context("Failed to resolve configuration")?;

    let hub = EventHub::new(
        config.bus.channel_capacity,
        config.bus.history_limit,
        config.identities.bus.clone(),
    )
    .shared();
    let client = HttpDefenseClient::new(config.dispatch.endpoints(), config.dispatch.timeout())
        .context("Failed to build defense client")?;

    let orchestrator = Orchestrator::start(
        hub,
        OrchestratorParts {
            identities: config.identities.clone(),
            dispatch: config.dispatch.settings(),
            arbiter: config.arbiter.settings(),
            client: Arc::new(client),
        },
    );
    let app = gateway::router(AppState::from_orchestrator(&orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.bus.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.bus.listen))?;
    info!(
        listen = %config.bus.listen,
        strict_defense = config.arbiter.require_all_defense_actions,
        timeout_secs = config.arbiter.campaign_timeout_secs,
        "Engagement hub listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Engagement hub server failed")?;

    orchestrator.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
