#![deny(warnings)]

//! Virtual-economy ledger for HANU-YOUTH.
//!
//! This crate provides the [`EconomyLedger`] state engine together with its
//! two ports:
//! - [`StateStore`] for durable storage of the state blob
//! - [`Clock`] for the calendar date that drives daily streaks
//!
//! The ledger is constructed explicitly by the application and handed to
//! whatever needs economy data.

pub mod clock;
mod ledger;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use economy_core::{
    Currency, EconomyState, LevelProgress, LevelReward, ShopItem, StatePatch, Transaction,
};
pub use ledger::{streak_outcome, EconomyLedger};
pub use store::{MemoryStore, StateStore, StoreError};

use economy_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for a ledger instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Number of recent transactions kept in memory; 0 disables history.
    pub history_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}

/// Errors returned by ledger operations. State is untouched whenever one is
/// returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Amounts and quantities must be positive.
    #[error("amount must be greater than zero")]
    ZeroAmount,
    /// Balance is lower than the requested spend.
    #[error("not enough {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    /// Inventory holds fewer items than requested.
    #[error("not enough {item}: need {needed}, have {available}")]
    InsufficientItems {
        item: String,
        needed: u64,
        available: u64,
    },
    /// No coin pack with this id in the catalog.
    #[error("unknown coin pack: {0}")]
    UnknownPack(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Effect of rolling the daily streak forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreakOutcome {
    /// Activity already happened today.
    Unchanged,
    /// Last activity was yesterday; streak grew by one.
    Extended,
    /// Gap of two or more days (or a date in the future); streak restarted at 1.
    Reset,
}

/// Result of an XP grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGrant {
    pub leveled_up: bool,
    pub level: u64,
    pub reward: Option<LevelReward>,
}

/// Notifications delivered to [`EconomyLedger::subscribe`] receivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    /// State was changed and saved by this ledger.
    Changed(EconomyState),
    /// An XP grant reached a new level.
    LeveledUp { level: u64, reward: LevelReward },
    /// State was replaced by a snapshot another writer stored.
    Reloaded(EconomyState),
}
