//! Range agents
//!
//! # Usage
//!
//! ```bash
//! # Replay the kill chain against a local hub, one step per second
//! range-agents attacker --pace-ms 1000
//!
//! # Serve the three defense endpoints on their default ports
//! range-agents defenders --bus-url ws://127.0.0.1:8080/ws/logs
//!
//! # Share the hub's config file for the bus endpoint and identities
//! range-agents --config engagement.toml attacker
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use range_agents::config::DEFAULT_DEFENDER_LISTEN;
use range_agents::{kill_chain_plan, router, DefenderState, RangeConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Hub config file (TOML); its bus and identity sections are used
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay the scripted kill chain onto the bus
    Attacker {
        /// Hub WebSocket endpoint (overrides ENGAGEMENT_BUS_URL)
        #[arg(long)]
        bus_url: Option<String>,

        /// Delay between script steps in milliseconds
        #[arg(long)]
        pace_ms: Option<u64>,
    },
    /// Serve the defense agent endpoints
    Defenders {
        /// Hub WebSocket endpoint (overrides ENGAGEMENT_BUS_URL)
        #[arg(long)]
        bus_url: Option<String>,

        /// Listen address; repeat to serve the routes on several ports
        #[arg(long, default_values_t = DEFAULT_DEFENDER_LISTEN.map(String::from))]
        listen: Vec<String>,

        /// Base delay between cascade steps in milliseconds
        #[arg(long)]
        pace_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match args.command {
        Command::Attacker { bus_url, pace_ms } => {
            let mut config = RangeConfig::resolve(args.config.as_deref(), bus_url)
                .context("Failed to resolve configuration")?;
            if let Some(ms) = pace_ms {
                config.attack_pace = Duration::from_millis(ms);
            }
            run_attacker(config).await
        }
        Command::Defenders {
            bus_url,
            listen,
            pace_ms,
        } => {
            let mut config = RangeConfig::resolve(args.config.as_deref(), bus_url)
                .context("Failed to resolve configuration")?;
            if let Some(ms) = pace_ms {
                config.defense_pace = Duration::from_millis(ms);
            }
            run_defenders(config, listen).await
        }
    }
}

async fn run_attacker(config: RangeConfig) -> Result<()> {
    let identity = config.attacker_identity().to_string();
    let plan = kill_chain_plan(&identity, config.attack_pace);
    info!(
        bus = %config.bus.url,
        steps = plan.len(),
        pace_ms = config.attack_pace.as_millis() as u64,
        "Attacker starting kill chain"
    );

    let (sink, publisher) = config.bus.client(identity).spawn_publisher();
    let sent = plan.run(&sink).await;
    drop(sink);

    publisher
        .await
        .context("Attacker publisher task panicked")?
        .context("Attacker lost the bus")?;
    info!(sent, "Kill chain complete");
    Ok(())
}

async fn run_defenders(config: RangeConfig, listen: Vec<String>) -> Result<()> {
    let (state, publishers) =
        DefenderState::connect(config.identities.clone(), config.defense_pace, &config.bus);
    let app = router(state);

    let mut servers = Vec::with_capacity(listen.len());
    for addr in &listen {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(listen = %addr, bus = %config.bus.url, "Defense endpoints listening");
        let app = app.clone();
        servers.push(tokio::spawn(async move { axum::serve(listener, app).await }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    for server in servers {
        server.abort();
    }
    for publisher in publishers {
        publisher.abort();
        if let Ok(Err(e)) = publisher.await {
            warn!(error = %e, "Defense publisher stopped with an error");
        }
    }
    Ok(())
}
