#![deny(warnings)]

//! Core data model and invariants for the HANU-YOUTH virtual economy.
//!
//! This crate defines the persisted [`EconomyState`] record, the partial
//! [`StatePatch`] used for tolerant loading and server sync, level math, and
//! the catalog types shared by the ledger and its front ends.

pub mod serde_date;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Storage key under which the state blob is persisted.
pub const STORAGE_KEY: &str = "virtual_economy_state";
/// Coins granted to a fresh profile.
pub const DEFAULT_COINS: u64 = 100;
/// Gems granted to a fresh profile.
pub const DEFAULT_GEMS: u64 = 10;
/// XP span of a single level.
pub const XP_PER_LEVEL: u64 = 1000;

/// Level reached with `xp` experience points: `floor(xp / 1000) + 1`.
pub fn level_for_xp(xp: u64) -> u64 {
    xp / XP_PER_LEVEL + 1
}

/// Reward paid when a level is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReward {
    pub coins: u64,
    pub gems: u64,
}

/// Reward for arriving at `level`: `level * 100` coins and one gem per five levels.
pub fn level_reward(level: u64) -> LevelReward {
    LevelReward {
        coins: level.saturating_mul(100),
        gems: level / 5,
    }
}

/// A user's complete economic and progress state on one device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomyState {
    /// Spendable common currency.
    pub coins: u64,
    /// Spendable premium currency.
    pub gems: u64,
    /// Experience total, never decreases through normal play.
    pub xp: u64,
    /// Derived from `xp`, see [`level_for_xp`].
    pub level: u64,
    /// Consecutive active days.
    pub streak: u64,
    /// Date of the last state-touching activity.
    #[serde(with = "serde_date")]
    pub last_active: NaiveDate,
    /// Owned item quantities keyed by item id.
    pub inventory: BTreeMap<String, u64>,
    /// Unlocked achievement keys.
    pub achievements: BTreeSet<String>,
}

impl EconomyState {
    /// Fresh profile with default balances, last active on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            coins: DEFAULT_COINS,
            gems: DEFAULT_GEMS,
            xp: 0,
            level: 1,
            streak: 0,
            last_active: today,
            inventory: BTreeMap::new(),
            achievements: BTreeSet::new(),
        }
    }

    /// Shallow overwrite of every field present in `patch`.
    ///
    /// `level` is never taken from the patch; it is re-derived from the
    /// merged `xp`.
    pub fn apply_patch(&mut self, patch: StatePatch) {
        let StatePatch {
            coins,
            gems,
            xp,
            level,
            streak,
            last_active,
            inventory,
            achievements,
        } = patch;
        if let Some(v) = coins {
            self.coins = v;
        }
        if let Some(v) = gems {
            self.gems = v;
        }
        if let Some(v) = xp {
            self.xp = v;
        }
        if let Some(v) = streak {
            self.streak = v;
        }
        if let Some(v) = last_active {
            self.last_active = v;
        }
        if let Some(v) = inventory {
            self.inventory = v;
        }
        if let Some(v) = achievements {
            self.achievements = v;
        }
        self.level = level_for_xp(self.xp);
        if let Some(supplied) = level {
            if supplied != self.level {
                debug!(supplied, derived = self.level, "ignoring supplied level");
            }
        }
    }

    /// Progress toward the next level.
    pub fn level_progress(&self) -> LevelProgress {
        LevelProgress::for_xp(self.xp)
    }
}

/// Partial [`EconomyState`]; absent fields are left untouched when applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gems: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<u64>,
    #[serde(with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub last_active: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<BTreeSet<String>>,
}

/// Errors decoding a persisted blob.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Blob is not JSON of the expected shape.
    #[error("malformed economy state: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize the state into its persisted JSON form.
pub fn encode_state(state: &EconomyState) -> Result<String, serde_json::Error> {
    serde_json::to_string(state)
}

/// Decode a persisted blob, filling missing fields with defaults for `today`.
pub fn decode_state(blob: &str, today: NaiveDate) -> Result<EconomyState, DecodeError> {
    let patch: StatePatch = serde_json::from_str(blob)?;
    let mut state = EconomyState::new(today);
    state.apply_patch(patch);
    Ok(state)
}

/// The two spendable currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Coins,
    Gems,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Coins => f.write_str("coins"),
            Currency::Gems => f.write_str("gems"),
        }
    }
}

/// Direction of a balance change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Earned,
    Spent,
}

/// One balance change, kept for the session's activity history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub kind: TxKind,
    pub currency: Currency,
    pub amount: u64,
    /// Reward source for earnings, purpose for spending.
    pub source: String,
    #[serde(with = "serde_date")]
    pub date: NaiveDate,
    pub balance_after: u64,
}

/// Price of a shop item in both currencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub coins: u64,
    pub gems: u64,
}

/// An item that can be bought into the inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub cost: Price,
}

/// A purchasable bundle of coins.
#[derive(Debug, Clone, Serialize)]
pub struct CoinPack {
    pub id: &'static str,
    pub coins: u64,
    pub bonus: u64,
    /// Display price in US cents; payment itself happens elsewhere.
    pub price_cents: u32,
}

impl CoinPack {
    /// Coins credited including the bonus.
    pub fn total_coins(&self) -> u64 {
        self.coins + self.bonus
    }

    /// Look up a pack in [`COIN_PACKS`].
    pub fn by_id(id: &str) -> Option<&'static CoinPack> {
        COIN_PACKS.iter().find(|p| p.id == id)
    }
}

/// Coin pack catalog.
pub static COIN_PACKS: &[CoinPack] = &[
    CoinPack {
        id: "pack_small",
        coins: 250,
        bonus: 0,
        price_cents: 199,
    },
    CoinPack {
        id: "pack_medium",
        coins: 750,
        bonus: 50,
        price_cents: 499,
    },
    CoinPack {
        id: "pack_large",
        coins: 2000,
        bonus: 300,
        price_cents: 1299,
    },
];

/// Position within the current level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u64,
    pub xp: u64,
    pub xp_into_level: u64,
    pub xp_to_next: u64,
}

impl LevelProgress {
    pub fn for_xp(xp: u64) -> Self {
        let xp_into_level = xp % XP_PER_LEVEL;
        Self {
            level: level_for_xp(xp),
            xp,
            xp_into_level,
            xp_to_next: XP_PER_LEVEL - xp_into_level,
        }
    }

    /// Fraction of the current level completed, in `[0, 1)`.
    pub fn fraction(&self) -> f32 {
        self.xp_into_level as f32 / XP_PER_LEVEL as f32
    }
}

/// Validation errors for state invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Stored level disagrees with the level derived from xp.
    #[error("level {stored} does not match xp-derived level {derived}")]
    LevelMismatch { stored: u64, derived: u64 },
    /// Identifiers must not be blank.
    #[error("identifier must not be empty")]
    EmptyId,
}

/// Validate the derived and structural invariants of a state.
pub fn validate_state(state: &EconomyState) -> Result<(), ValidationError> {
    let derived = level_for_xp(state.xp);
    if state.level != derived {
        return Err(ValidationError::LevelMismatch {
            stored: state.level,
            derived,
        });
    }
    for id in state.inventory.keys() {
        validate_id(id)?;
    }
    for id in &state.achievements {
        validate_id(id)?;
    }
    Ok(())
}

/// Validate a shop item before it is bought.
pub fn validate_shop_item(item: &ShopItem) -> Result<(), ValidationError> {
    validate_id(&item.id)
}

/// Reject blank identifiers.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_match_fresh_profile() {
        let s = EconomyState::new(day(2024, 5, 1));
        assert_eq!((s.coins, s.gems, s.xp, s.level, s.streak), (100, 10, 0, 1, 0));
        assert!(s.inventory.is_empty());
        assert!(s.achievements.is_empty());
        validate_state(&s).unwrap();
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(999), 1);
        assert_eq!(level_for_xp(1000), 2);
        assert_eq!(level_for_xp(4999), 5);
    }

    #[test]
    fn reward_table() {
        assert_eq!(level_reward(2), LevelReward { coins: 200, gems: 0 });
        assert_eq!(level_reward(5), LevelReward { coins: 500, gems: 1 });
        assert_eq!(level_reward(12), LevelReward { coins: 1200, gems: 2 });
    }

    #[test]
    fn blob_uses_camel_case_field_names() {
        let mut s = EconomyState::new(day(2024, 5, 1));
        s.inventory.insert("avatar_frame".into(), 2);
        s.achievements.insert("first_quiz".into());
        let v: serde_json::Value = serde_json::from_str(&encode_state(&s).unwrap()).unwrap();
        assert_eq!(v["lastActive"], "2024-05-01");
        assert_eq!(v["inventory"]["avatar_frame"], 2);
        assert_eq!(v["achievements"][0], "first_quiz");
    }

    #[test]
    fn decode_fills_missing_fields() {
        let today = day(2024, 5, 1);
        let s = decode_state(r#"{"coins": 42, "xp": 2500}"#, today).unwrap();
        assert_eq!(s.coins, 42);
        assert_eq!(s.gems, DEFAULT_GEMS);
        assert_eq!(s.level, 3);
        assert_eq!(s.last_active, today);
    }

    #[test]
    fn decode_rederives_level_and_ignores_unknown_fields() {
        let s = decode_state(r#"{"xp": 10, "level": 9, "theme": "dark"}"#, day(2024, 5, 1)).unwrap();
        assert_eq!(s.level, 1);
    }

    #[test]
    fn decode_accepts_legacy_timestamp() {
        let s = decode_state(
            r#"{"lastActive": "2024-04-30T08:15:00.000Z", "streak": 3}"#,
            day(2024, 5, 1),
        )
        .unwrap();
        assert_eq!(s.last_active, day(2024, 4, 30));
        assert_eq!(s.streak, 3);
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        let today = day(2024, 5, 1);
        assert!(decode_state("not json", today).is_err());
        assert!(decode_state("null", today).is_err());
        assert!(decode_state(r#"{"coins": -5}"#, today).is_err());
        assert!(decode_state(r#"{"achievements": "all"}"#, today).is_err());
    }

    #[test]
    fn patch_overwrites_only_given_fields() {
        let mut s = EconomyState::new(day(2024, 5, 1));
        s.achievements.insert("keep".into());
        s.apply_patch(StatePatch {
            gems: Some(77),
            xp: Some(3100),
            ..Default::default()
        });
        assert_eq!(s.gems, 77);
        assert_eq!(s.coins, DEFAULT_COINS);
        assert_eq!(s.level, 4);
        assert!(s.achievements.contains("keep"));
    }

    #[test]
    fn validation_flags_mismatched_level() {
        let mut s = EconomyState::new(day(2024, 5, 1));
        s.level = 3;
        assert_eq!(
            validate_state(&s),
            Err(ValidationError::LevelMismatch { stored: 3, derived: 1 })
        );
        s.level = 1;
        s.inventory.insert("hat".into(), 0);
        validate_state(&s).unwrap();
        s.inventory.insert(String::new(), 2);
        assert_eq!(validate_state(&s), Err(ValidationError::EmptyId));
    }

    #[test]
    fn coin_pack_catalog() {
        let pack = CoinPack::by_id("pack_medium").unwrap();
        assert_eq!(pack.total_coins(), 800);
        assert!(CoinPack::by_id("pack_huge").is_none());
    }

    #[test]
    fn shop_item_needs_id() {
        let item = ShopItem {
            id: " ".into(),
            name: "Blank".into(),
            cost: Price::default(),
        };
        assert_eq!(validate_shop_item(&item), Err(ValidationError::EmptyId));
    }

    proptest! {
        #[test]
        fn progress_is_consistent(xp in 0u64..10_000_000) {
            let p = LevelProgress::for_xp(xp);
            prop_assert_eq!(p.level, level_for_xp(xp));
            prop_assert_eq!(p.xp_into_level + p.xp_to_next, XP_PER_LEVEL);
            prop_assert!(p.fraction() >= 0.0 && p.fraction() < 1.0);
        }

        #[test]
        fn level_is_monotonic(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for_xp(lo) <= level_for_xp(hi));
        }
    }
}
