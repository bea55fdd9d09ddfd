//! Range agents
//!
//! Scripted stand-ins for the agents of an engagement exercise:
//! - [`script`]: the attacker's kill-chain replay
//! - [`defenders`]: HTTP endpoints for the three defense agents, each
//!   answering a dispatch call with a completion cascade on the bus

pub mod config;
pub mod defenders;
pub mod script;

pub use config::RangeConfig;
pub use defenders::{router, DefenderState};
pub use script::{kill_chain_plan, KILL_CHAIN};
