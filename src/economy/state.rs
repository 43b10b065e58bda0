//! Player economy state.

use super::catalog::Catalog;

/// Everything that belongs to one player's session.
///
/// `production_rate` is a cache of `Σ owned[i] * catalog[i].production_rate`;
/// only [`PlayerState::recompute_production_rate`] writes it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Spendable resource. Never negative.
    pub balance: f64,
    /// Units owned per generator id, aligned with the catalog.
    pub owned: Vec<u32>,
    /// Cached total output per second.
    pub production_rate: f64,
    /// Epoch millis of the last settlement into `balance`.
    pub last_claim_ms: i64,
    /// Lifetime sum of claimed rewards.
    pub total_earned: f64,
}

impl PlayerState {
    /// The zero state: nothing owned, nothing earned, clock anchored at `now_ms`.
    pub fn new(catalog: &Catalog, now_ms: i64) -> Self {
        Self {
            balance: 0.0,
            owned: vec![0; catalog.len()],
            production_rate: 0.0,
            last_claim_ms: now_ms,
            total_earned: 0.0,
        }
    }

    /// Fresh state for a first connection, with the starter grant.
    pub fn fresh(catalog: &Catalog, now_ms: i64, starter_balance: f64) -> Self {
        let mut state = Self::new(catalog, now_ms);
        state.balance = starter_balance.max(0.0);
        state
    }

    /// Units owned of `id` (0 for ids outside the inventory).
    pub fn owned_count(&self, id: usize) -> u32 {
        self.owned.get(id).copied().unwrap_or(0)
    }

    /// Full resum over every tier; never an incremental add.
    pub fn recompute_production_rate(&mut self, catalog: &Catalog) {
        self.production_rate = catalog
            .iter()
            .map(|t| self.owned_count(t.id) as f64 * t.production_rate)
            .sum();
    }

    /// Whether the cached rate matches what the inventory implies.
    pub fn production_rate_is_consistent(&self, catalog: &Catalog) -> bool {
        let mut recomputed = self.clone();
        recomputed.recompute_production_rate(catalog);
        recomputed.production_rate == self.production_rate
    }

    pub fn total_units(&self) -> u64 {
        self.owned.iter().map(|&c| c as u64).sum()
    }
}
