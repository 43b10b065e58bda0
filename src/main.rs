//! Headless driver.
//!
//! `idle-economy [identity] [seconds]` connects an identity from the save
//! directory and autoplays it. `idle-economy --simulate [seconds]` runs the
//! balance simulator from a fresh state and prints checkpoints. Time is
//! simulated in both modes, so a run finishes immediately.

use std::env;
use std::error::Error;

use idle_economy::config::EconomyConfig;
use idle_economy::economy::catalog::Catalog;
use idle_economy::economy::logic::format_number;
use idle_economy::economy::simulator;
use idle_economy::session::{Action, Session, SessionError, WalletAddress};
use idle_economy::store::{FileStore, SaveStore};
use idle_economy::time::{Clock, GameTime, ManualClock, SystemClock};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SECONDS: u32 = 120;
const STEP_MS: i64 = 100;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = EconomyConfig::from_env();

    if args.first().map(String::as_str) == Some("--simulate") {
        let seconds = parse_seconds(args.get(1))?;
        run_simulation(&config, seconds);
        return Ok(());
    }

    let identity = args.first().map(|s| WalletAddress::parse(s)).transpose()?;
    let seconds = parse_seconds(args.get(1))?;
    autoplay(config, identity, seconds)
}

fn parse_seconds(arg: Option<&String>) -> Result<u32, Box<dyn Error>> {
    match arg {
        Some(s) => Ok(s.parse()?),
        None => Ok(DEFAULT_SECONDS),
    }
}

fn run_simulation(config: &EconomyConfig, seconds: u32) {
    let report = simulator::simulate(
        Catalog::reference(),
        config.min_claim,
        config.starter_balance,
        seconds,
    );

    println!("=== Idle Economy Balance Simulation ({}s) ===", seconds);
    println!(
        "{:>6}  {:>10}  {:>10}  {:>10}  owned",
        "t(s)", "balance", "rate/s", "earned"
    );
    for cp in &report.checkpoints {
        println!(
            "{:>6}  {:>10}  {:>10}  {:>10}  {:?}",
            cp.second,
            format_number(cp.balance),
            format_number(cp.production_rate),
            format_number(cp.total_earned),
            cp.owned
        );
    }
    println!(
        "purchases: {}  claims: {}  longest idle gap: {}s",
        report.purchases, report.claims, report.longest_idle_gap
    );
}

fn autoplay(
    config: EconomyConfig,
    identity: Option<WalletAddress>,
    seconds: u32,
) -> Result<(), Box<dyn Error>> {
    let store = FileStore::new(config.save_dir());
    let clock = ManualClock::new(SystemClock.now_ms());
    let mut game_time = GameTime::new(config.ticks_per_sec);
    let session = Session::new(Catalog::reference(), config, store, clock.clone());

    let identity = session.connect(identity)?;
    info!(identity = %identity, seconds, "autoplay started");

    game_time.update(clock.now_ms());
    let steps = i64::from(seconds) * 1_000 / STEP_MS;
    for _ in 0..steps {
        clock.advance(STEP_MS);

        if let Some(settled) = session.tick() {
            if let Err(e) = settled.result {
                warn!(action = ?settled.action, error = %e, "action failed at settle");
            }
        }

        if session.in_flight().is_none() {
            if let Some(action) = next_action(&session) {
                if let Err(e) = submit_if_ready(&session, action) {
                    debug!(?action, error = %e, "submit failed");
                }
            }
        }

        for _ in 0..game_time.update(clock.now_ms()) {
            session.refresh();
        }
    }

    let snapshot = session.refresh();
    info!(
        identity = %identity,
        balance = %format_number(snapshot.balance),
        rate = %format_number(snapshot.production_rate),
        total_earned = %format_number(snapshot.total_earned),
        owned = ?snapshot.owned,
        refreshes = game_time.total_ticks,
        "autoplay finished"
    );
    Ok(())
}

/// Submit `action`. A failed pre-check only means there is nothing to do
/// yet and is not an error; `Busy` and store failures are.
fn submit_if_ready<S: SaveStore, C: Clock>(
    session: &Session<S, C>,
    action: Action,
) -> Result<(), SessionError> {
    match session.submit(action) {
        Ok(_) | Err(SessionError::Economy(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Buy the best-payback generator when one is affordable, otherwise claim.
fn next_action<S: SaveStore, C: Clock>(session: &Session<S, C>) -> Option<Action> {
    match session.best_purchase() {
        Some(id) => Some(Action::Purchase(id)),
        None if session.pending_rewards() >= session.config().min_claim => Some(Action::Claim),
        None => None,
    }
}
