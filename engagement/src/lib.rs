//! Engagement Orchestrator
//!
//! Coordinates a simulated attack/defense exercise over a shared event bus:
//! - An event hub that fans out JSON log events to every connected peer
//! - A progress tracker that maps attacker activity onto the kill chain
//! - A dispatch engine that calls defense agents, with dedup and rate limits
//! - A victory arbiter that keeps the battle ledger and declares the outcome
//!
//! # Components
//!
//! Each component is a [`runtime::BusConsumer`] driven by its own loop and
//! peer connection. [`runtime::Orchestrator`] wires all three to one hub;
//! [`gateway::router`] exposes the hub over WebSocket and HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Hub, components and query surface on the default port
//! engagement
//!
//! # Custom config, strict defense completion
//! ENGAGEMENT_PAUSE_MS=500 engagement --config engagement.toml --strict-defense
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod arbiter;
pub mod cascade;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod resilience;
pub mod runtime;
pub mod tracker;

pub use arbiter::{BattleLedger, BattleReport, BattleStatus, LedgerSnapshot, VictoryArbiter};
pub use cascade::CascadePlan;
pub use client::{BusClient, BusConnection, RemoteSink};
pub use config::{ConfigError, ConfigOverrides, ConfigResult, EngagementConfig};
pub use dispatch::{DefenseClient, DispatchEngine, HttpDefenseClient, ResponseClass};
pub use events::{Event, EventHub, EventSink, Level, Peer, SharedEventHub};
pub use identity::{AgentIdentities, Role};
pub use resilience::{RetryPolicy, TransportError, TransportResult};
pub use runtime::{BusConsumer, Orchestrator, OrchestratorParts};
pub use tracker::{KillChainStage, ProgressTracker};
