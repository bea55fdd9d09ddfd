//! Defense dispatch
//!
//! Classifies attacker activity into response classes and calls the
//! matching defense agents, subject to deduplication, per-class rate limits
//! and priority ordering.

pub mod client;
pub mod context;
pub mod dedup;
pub mod engine;
pub mod payload;
pub mod rate_limit;
pub mod rules;

pub use client::{DefenseAck, DefenseClient, DispatchError, DispatchResult, HttpDefenseClient};
pub use context::{
    extract_cves, extract_hosts, extract_ipv4s, DispatchContext, ExtractedInfo,
};
pub use dedup::{DedupKey, DedupTable, DedupVerdict};
pub use engine::{
    Attempt, DispatchEngine, DispatchOutcome, DispatchSettings, DispatchSnapshot, IgnoreReason,
};
pub use payload::{build_payload, ClassFields, DispatchPayload};
pub use rate_limit::RateLimiter;
pub use rules::{ResponseClass, RuleTable};
