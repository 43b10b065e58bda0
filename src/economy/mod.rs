//! Idle economy — generators, accrual and claims.

pub mod catalog;
pub mod error;
pub mod logic;
pub mod save;
pub mod simulator;
pub mod state;

use catalog::Catalog;
use error::EconomyError;
use logic::Purchase;
use save::{Loaded, SaveRecord};
use state::PlayerState;

/// Default claim threshold.
pub const MIN_CLAIM: f64 = 0.01;

/// One player's economy: the immutable catalog plus the mutable state.
///
/// This is the caller-facing surface: `purchase`, `claim`, `pending_rewards`,
/// `current_cost`, `save`, `load`. Mutating calls take `&mut self`, so the
/// borrow checker already rules out interleaved read-modify-write on one
/// engine; sharing across threads goes through `session::Session`.
#[derive(Clone, Debug)]
pub struct EconomyEngine {
    catalog: Catalog,
    min_claim: f64,
    state: PlayerState,
}

impl EconomyEngine {
    /// Engine holding the zero state anchored at `now_ms`.
    pub fn new(catalog: Catalog, min_claim: f64, now_ms: i64) -> Self {
        let state = PlayerState::new(&catalog, now_ms);
        Self {
            catalog,
            min_claim,
            state,
        }
    }

    /// Engine for a first-time player with the starter grant.
    pub fn fresh(catalog: Catalog, min_claim: f64, now_ms: i64, starter_balance: f64) -> Self {
        let state = PlayerState::fresh(&catalog, now_ms, starter_balance);
        Self {
            catalog,
            min_claim,
            state,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn min_claim(&self) -> f64 {
        self.min_claim
    }

    pub fn current_cost(&self, id: usize) -> Result<f64, EconomyError> {
        logic::cost(&self.state, &self.catalog, id)
    }

    pub fn purchase(&mut self, id: usize) -> Result<Purchase, EconomyError> {
        logic::purchase(&mut self.state, &self.catalog, id)
    }

    pub fn pending_rewards(&self, now_ms: i64) -> f64 {
        logic::pending_rewards(&self.state, now_ms)
    }

    pub fn claim(&mut self, now_ms: i64) -> Result<f64, EconomyError> {
        logic::claim(&mut self.state, now_ms, self.min_claim)
    }

    /// Check a purchase without performing it.
    pub fn check_purchase(&self, id: usize) -> Result<f64, EconomyError> {
        let cost = self.current_cost(id)?;
        if cost > self.state.balance {
            return Err(EconomyError::InsufficientBalance {
                cost,
                balance: self.state.balance,
            });
        }
        Ok(cost)
    }

    /// Check a claim without performing it.
    pub fn check_claim(&self, now_ms: i64) -> Result<f64, EconomyError> {
        let pending = self.pending_rewards(now_ms);
        if pending < self.min_claim {
            return Err(EconomyError::NothingToClaim { pending });
        }
        Ok(pending)
    }

    pub fn save(&self, wallet_address: Option<&str>) -> SaveRecord {
        save::extract_save(&self.state, wallet_address)
    }

    /// Replace the state from a record. Never fails; see `save::apply_save`.
    pub fn load(&mut self, record: &SaveRecord, now_ms: i64) -> Loaded {
        let loaded = save::apply_save(record, &self.catalog, now_ms);
        self.state = loaded.state.clone();
        loaded
    }

    /// Replace the state from serialized text.
    pub fn load_str(&mut self, text: &str, now_ms: i64) -> Loaded {
        let loaded = save::deserialize(text, &self.catalog, now_ms);
        self.state = loaded.state.clone();
        loaded
    }

    /// Back to the zero state.
    pub fn reset(&mut self, now_ms: i64) {
        self.state = PlayerState::new(&self.catalog, now_ms);
    }
}
