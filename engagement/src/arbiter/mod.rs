//! Victory arbitration
//!
//! The arbiter folds attacker, defense and tracker events into a
//! [`BattleLedger`] and declares the outcome exactly once. Readers never
//! touch the ledger directly; they get [`LedgerSnapshot`] copies through a
//! watch channel.

pub mod judge;
pub mod ledger;
pub mod rules;

pub use judge::{is_verdict, ArbiterSettings, VictoryArbiter, BATTLE_REPORT_KEY, BATTLE_STATE_KEY};
pub use ledger::{
    AssetSet, AttackFlag, BattleLedger, BattleReport, BattleStatus, DefenseFlag, LedgerSnapshot,
};
