//! The economy ledger: one user's balances, progress and streak.

use crate::clock::{Clock, SystemClock};
use crate::store::StateStore;
use crate::{LedgerConfig, LedgerError, LedgerEvent, StreakOutcome, XpGrant};
use chrono::NaiveDate;
use economy_core::{
    decode_state, encode_state, level_for_xp, level_reward, validate_id, validate_shop_item,
    CoinPack, Currency, EconomyState, LevelProgress, ShopItem, StatePatch, Transaction, TxKind,
};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, info, warn};

/// Authoritative record of a user's economy state on this device.
///
/// Every accepted mutation rolls the daily streak forward first, applies its
/// change in memory, and saves the whole state through the store before
/// returning. Rejected operations leave state and storage untouched. Storage failures are logged and the in-memory state stays
/// authoritative for the session.
pub struct EconomyLedger<S, C = SystemClock> {
    store: S,
    clock: C,
    config: LedgerConfig,
    state: EconomyState,
    history: VecDeque<Transaction>,
    subscribers: Vec<Sender<LedgerEvent>>,
}

impl<S: StateStore> EconomyLedger<S, SystemClock> {
    /// Open the ledger over `store` using the local date.
    pub fn open(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: StateStore, C: Clock> EconomyLedger<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self::with_config(store, clock, LedgerConfig::default())
    }

    /// Load persisted state (or defaults) and bring the streak up to date.
    pub fn with_config(mut store: S, clock: C, config: LedgerConfig) -> Self {
        let today = clock.today();
        let state = load_state(&mut store, today).unwrap_or_else(|| EconomyState::new(today));
        let mut ledger = Self {
            store,
            clock,
            config,
            state,
            history: VecDeque::new(),
            subscribers: Vec::new(),
        };
        ledger.evaluate_streak();
        ledger
    }

    /// Roll the daily streak forward to today.
    pub fn evaluate_streak(&mut self) -> StreakOutcome {
        let today = self.clock.today();
        let outcome = streak_outcome(self.state.last_active, today);
        match outcome {
            StreakOutcome::Unchanged => return outcome,
            StreakOutcome::Extended => self.state.streak = self.state.streak.saturating_add(1),
            StreakOutcome::Reset => self.state.streak = 1,
        }
        self.state.last_active = today;
        debug!(streak = self.state.streak, ?outcome, "streak rolled forward");
        self.persist();
        outcome
    }

    /// Grant experience; pays the level-up reward for the level reached.
    ///
    /// When a single grant crosses several levels the reward is paid once,
    /// for the final level only.
    pub fn add_xp(&mut self, amount: u64, source: &str) -> Result<XpGrant, LedgerError> {
        ensure_positive(amount)?;
        self.evaluate_streak();
        let old_level = self.state.level;
        self.state.xp = self.state.xp.saturating_add(amount);
        let new_level = level_for_xp(self.state.xp);
        self.state.level = new_level;

        let reward = (new_level > old_level).then_some(level_reward(new_level));
        if let Some(reward) = reward {
            self.state.coins = self.state.coins.saturating_add(reward.coins);
            self.state.gems = self.state.gems.saturating_add(reward.gems);
            let today = self.clock.today();
            if reward.coins > 0 {
                self.record(TxKind::Earned, Currency::Coins, reward.coins, "level_up", today);
            }
            if reward.gems > 0 {
                self.record(TxKind::Earned, Currency::Gems, reward.gems, "level_up", today);
            }
            info!(from = old_level, to = new_level, source, "level up");
        }
        debug!(amount, xp = self.state.xp, source, "xp granted");
        self.persist();
        if let Some(reward) = reward {
            self.notify(LedgerEvent::LeveledUp {
                level: new_level,
                reward,
            });
        }
        Ok(XpGrant {
            leveled_up: reward.is_some(),
            level: new_level,
            reward,
        })
    }

    /// Credit coins; returns the new balance.
    pub fn add_coins(&mut self, amount: u64, source: &str) -> Result<u64, LedgerError> {
        self.earn(Currency::Coins, amount, source)
    }

    /// Credit gems; returns the new balance.
    pub fn add_gems(&mut self, amount: u64, source: &str) -> Result<u64, LedgerError> {
        self.earn(Currency::Gems, amount, source)
    }

    /// Debit coins; fails without touching state when the balance is short.
    pub fn spend_coins(&mut self, amount: u64, purpose: &str) -> Result<u64, LedgerError> {
        self.spend(Currency::Coins, amount, purpose)
    }

    /// Debit gems; fails without touching state when the balance is short.
    pub fn spend_gems(&mut self, amount: u64, purpose: &str) -> Result<u64, LedgerError> {
        self.spend(Currency::Gems, amount, purpose)
    }

    /// Buy one unit of `item`, paying both of its prices or neither.
    ///
    /// Returns the quantity now held.
    pub fn purchase(&mut self, item: &ShopItem) -> Result<u64, LedgerError> {
        validate_shop_item(item)?;
        self.check_funds(Currency::Coins, item.cost.coins)?;
        self.check_funds(Currency::Gems, item.cost.gems)?;
        self.evaluate_streak();

        let today = self.clock.today();
        let purpose = format!("purchase:{}", item.id);
        if item.cost.coins > 0 {
            self.state.coins -= item.cost.coins;
            self.record(TxKind::Spent, Currency::Coins, item.cost.coins, &purpose, today);
        }
        if item.cost.gems > 0 {
            self.state.gems -= item.cost.gems;
            self.record(TxKind::Spent, Currency::Gems, item.cost.gems, &purpose, today);
        }
        let held = self.state.inventory.entry(item.id.clone()).or_insert(0);
        *held = held.saturating_add(1);
        let held = *held;
        info!(item = %item.id, held, "item purchased");
        self.persist();
        Ok(held)
    }

    /// Use up `quantity` of an owned item; returns what remains.
    pub fn consume_item(&mut self, id: &str, quantity: u64) -> Result<u64, LedgerError> {
        validate_id(id)?;
        ensure_positive(quantity)?;
        let available = self.state.inventory.get(id).copied().unwrap_or(0);
        if available < quantity {
            return Err(LedgerError::InsufficientItems {
                item: id.to_string(),
                needed: quantity,
                available,
            });
        }
        self.evaluate_streak();
        let remaining = available - quantity;
        if remaining == 0 {
            self.state.inventory.remove(id);
        } else {
            self.state.inventory.insert(id.to_string(), remaining);
        }
        debug!(item = id, remaining, "item consumed");
        self.persist();
        Ok(remaining)
    }

    /// Credit a catalog coin pack including its bonus; returns the new balance.
    pub fn grant_coin_pack(&mut self, pack_id: &str) -> Result<u64, LedgerError> {
        let pack = CoinPack::by_id(pack_id)
            .ok_or_else(|| LedgerError::UnknownPack(pack_id.to_string()))?;
        self.earn(Currency::Coins, pack.total_coins(), &format!("pack:{}", pack.id))
    }

    /// Record an achievement; `Ok(false)` when it was already unlocked.
    pub fn unlock_achievement(&mut self, id: &str) -> Result<bool, LedgerError> {
        validate_id(id)?;
        self.evaluate_streak();
        if !self.state.achievements.insert(id.to_string()) {
            return Ok(false);
        }
        info!(achievement = id, "achievement unlocked");
        self.persist();
        Ok(true)
    }

    /// Owned snapshot of the current state.
    pub fn state(&self) -> EconomyState {
        self.state.clone()
    }

    pub fn level_progress(&self) -> LevelProgress {
        self.state.level_progress()
    }

    /// Recent balance changes of this session, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.history.iter().cloned().collect()
    }

    /// Discard all progress and start over from defaults.
    pub fn reset(&mut self) {
        self.state = EconomyState::new(self.clock.today());
        self.history.clear();
        info!("economy state reset");
        self.persist();
    }

    /// Merge fields owned by the profile server and persist.
    pub fn sync_with_server_data(&mut self, patch: StatePatch) {
        self.state.apply_patch(patch);
        debug!(level = self.state.level, "state synced from server");
        self.persist();
    }

    /// Reload the snapshot if another writer replaced it.
    ///
    /// Returns whether in-memory state was replaced. The latest stored blob
    /// always wins; nothing is merged. A reloaded snapshot has its streak
    /// rolled forward to today like one loaded at startup.
    pub fn refresh_if_changed(&mut self) -> bool {
        match self.store.changed_externally() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                warn!(error = %err, "could not check store for external changes");
                return false;
            }
        }
        match load_state(&mut self.store, self.clock.today()) {
            Some(state) => {
                self.state = state;
                info!("reloaded state written elsewhere");
                self.notify(LedgerEvent::Reloaded(self.state.clone()));
                self.evaluate_streak();
                true
            }
            None => false,
        }
    }

    /// Receive an event for every persisted change.
    pub fn subscribe(&mut self) -> Receiver<LedgerEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn earn(&mut self, currency: Currency, amount: u64, source: &str) -> Result<u64, LedgerError> {
        ensure_positive(amount)?;
        self.evaluate_streak();
        let balance = self.balance_mut(currency);
        *balance = balance.saturating_add(amount);
        let balance = *balance;
        self.record(TxKind::Earned, currency, amount, source, self.clock.today());
        debug!(%currency, amount, balance, source, "currency earned");
        self.persist();
        Ok(balance)
    }

    fn spend(&mut self, currency: Currency, amount: u64, purpose: &str) -> Result<u64, LedgerError> {
        ensure_positive(amount)?;
        self.check_funds(currency, amount)?;
        self.evaluate_streak();
        let balance = self.balance_mut(currency);
        *balance -= amount;
        let balance = *balance;
        self.record(TxKind::Spent, currency, amount, purpose, self.clock.today());
        debug!(%currency, amount, balance, purpose, "currency spent");
        self.persist();
        Ok(balance)
    }

    fn check_funds(&self, currency: Currency, needed: u64) -> Result<(), LedgerError> {
        let available = match currency {
            Currency::Coins => self.state.coins,
            Currency::Gems => self.state.gems,
        };
        if available < needed {
            debug!(%currency, needed, available, "insufficient funds");
            return Err(LedgerError::InsufficientFunds {
                currency,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn balance_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Coins => &mut self.state.coins,
            Currency::Gems => &mut self.state.gems,
        }
    }

    fn record(
        &mut self,
        kind: TxKind,
        currency: Currency,
        amount: u64,
        source: &str,
        date: NaiveDate,
    ) {
        if self.config.history_limit == 0 {
            return;
        }
        let balance_after = match currency {
            Currency::Coins => self.state.coins,
            Currency::Gems => self.state.gems,
        };
        while self.history.len() >= self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(Transaction {
            kind,
            currency,
            amount,
            source: source.to_string(),
            date,
            balance_after,
        });
    }

    fn persist(&mut self) {
        match encode_state(&self.state) {
            Ok(blob) => {
                if let Err(err) = self.store.save(&blob) {
                    warn!(error = %err, "failed to save economy state; keeping in-memory copy");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode economy state"),
        }
        self.notify(LedgerEvent::Changed(self.state.clone()));
    }

    fn notify(&mut self, event: LedgerEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// How the streak moves when activity happens on `today`.
pub fn streak_outcome(last_active: NaiveDate, today: NaiveDate) -> StreakOutcome {
    if last_active == today {
        return StreakOutcome::Unchanged;
    }
    if last_active.succ_opt() == Some(today) {
        StreakOutcome::Extended
    } else {
        StreakOutcome::Reset
    }
}

fn ensure_positive(amount: u64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    Ok(())
}

fn load_state<S: StateStore>(store: &mut S, today: NaiveDate) -> Option<EconomyState> {
    let blob = match store.load() {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(err) => {
            warn!(error = %err, "failed to read economy state");
            return None;
        }
    };
    match decode_state(&blob, today) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(error = %err, "discarding malformed economy state");
            None
        }
    }
}
