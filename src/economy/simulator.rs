//! Balance simulator: greedy autoplay over simulated time.
//!
//! Every simulated second the player claims whatever is pending, then buys
//! the affordable generator with the best payback until nothing is
//! affordable. Useful for eyeballing how fast the curve ramps.

use super::catalog::Catalog;
use super::logic;
use super::state::PlayerState;
use super::EconomyEngine;

/// Progress sample taken at a report time.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub second: u32,
    pub balance: f64,
    pub production_rate: f64,
    pub total_earned: f64,
    pub owned: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationReport {
    pub seconds: u32,
    pub purchases: u32,
    pub claims: u32,
    /// Longest stretch of seconds without a purchase.
    pub longest_idle_gap: u32,
    pub checkpoints: Vec<Checkpoint>,
    pub final_state: PlayerState,
}

/// Seconds at which a checkpoint is recorded (plus the final second).
const REPORT_TIMES: [u32; 8] = [30, 60, 120, 300, 600, 900, 1800, 3600];

/// Purchases attempted per simulated second.
const MAX_BUYS_PER_SECOND: u32 = 50;

/// Run greedy autoplay for `seconds` from a fresh state with `starter_balance`.
pub fn simulate(
    catalog: Catalog,
    min_claim: f64,
    starter_balance: f64,
    seconds: u32,
) -> SimulationReport {
    let mut engine = EconomyEngine::fresh(catalog, min_claim, 0, starter_balance);
    let mut purchases = 0;
    let mut claims = 0;
    let mut last_purchase = 0;
    let mut longest_idle_gap = 0;
    let mut checkpoints = Vec::new();

    for second in 1..=seconds {
        let now_ms = second as i64 * 1_000;
        if engine.claim(now_ms).is_ok() {
            claims += 1;
        }

        let mut bought = false;
        for _ in 0..MAX_BUYS_PER_SECOND {
            let Some(id) = logic::best_purchase(engine.state(), engine.catalog()) else {
                break;
            };
            if engine.purchase(id).is_err() {
                break;
            }
            purchases += 1;
            bought = true;
        }

        if bought {
            longest_idle_gap = longest_idle_gap.max(second - last_purchase);
            last_purchase = second;
        }

        if REPORT_TIMES.contains(&second) || second == seconds {
            checkpoints.push(checkpoint(second, engine.state()));
        }
    }
    longest_idle_gap = longest_idle_gap.max(seconds.saturating_sub(last_purchase));

    SimulationReport {
        seconds,
        purchases,
        claims,
        longest_idle_gap,
        checkpoints,
        final_state: engine.state().clone(),
    }
}

fn checkpoint(second: u32, state: &PlayerState) -> Checkpoint {
    Checkpoint {
        second,
        balance: state.balance,
        production_rate: state.production_rate,
        total_earned: state.total_earned,
        owned: state.owned.clone(),
    }
}
