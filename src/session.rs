//! Player session: identity, connect/disconnect, confirmation latency and
//! change notification around one [`EconomyEngine`].
//!
//! ## Locking
//!
//! The engine sits behind an `RwLock`. `purchase` and `claim` hold the write
//! lock across check, mutation and serialization, so two overlapping
//! requests can never spend the same balance twice. The store write happens
//! after the lock is released; each save carries a revision and a save older
//! than the last one written is skipped. Reads (`pending_rewards`,
//! `snapshot`) take the read lock only and never wait on the store.
//!
//! ## Notification
//!
//! Listeners run with no lock held and may call back into the session. A
//! change made while listeners are running is delivered once the current
//! round finishes.
//!
//! ## Latency
//!
//! `submit` parks one action with a due time; `tick` settles it once due by
//! making exactly one engine call. Only one action may be in flight.

use std::fmt;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EconomyConfig;
use crate::economy::catalog::Catalog;
use crate::economy::error::EconomyError;
use crate::economy::logic::{self, Purchase};
use crate::economy::save::{self, LoadQuality, SaveRecord, MIN_COMPATIBLE_VERSION, SAVE_VERSION};
use crate::economy::EconomyEngine;
use crate::store::{SaveStore, StoreError};
use crate::time::Clock;

const ADDRESS_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz123456789";
const ADDRESS_LEN: usize = 44;
const MAX_IDENTITY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no player is connected")]
    NotConnected,

    #[error("another action is still being confirmed")]
    Busy,

    #[error("invalid identity {0:?}: expected 1-64 ASCII letters or digits")]
    InvalidIdentity(String),

    #[error(transparent)]
    Economy(#[from] EconomyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Session identity. Also the save key, so it is restricted to ASCII alphanumerics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(s: &str) -> Result<Self, SessionError> {
        let ok = !s.is_empty()
            && s.len() <= MAX_IDENTITY_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric());
        if ok {
            Ok(Self(s.to_string()))
        } else {
            Err(SessionError::InvalidIdentity(s.to_string()))
        }
    }

    /// A 44-character base58-style address.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let address = (0..ADDRESS_LEN)
            .map(|_| ADDRESS_ALPHABET[rng.gen_range(0..ADDRESS_ALPHABET.len())] as char)
            .collect();
        Self(address)
    }

    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A state-changing request from the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    Purchase(usize),
    Claim,
}

/// What a settled action did.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Purchased(Purchase),
    Claimed { amount: f64 },
}

/// An in-flight action that `tick` has settled.
#[derive(Debug)]
pub struct Settled {
    pub action: Action,
    pub result: Result<Outcome, SessionError>,
}

/// Read-only view handed to subscribers and the refresh loop.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub identity: Option<String>,
    pub at_ms: i64,
    pub balance: f64,
    pub pending_rewards: f64,
    pub production_rate: f64,
    pub total_earned: f64,
    pub owned: Vec<u32>,
    /// Next-unit cost per generator id.
    pub next_costs: Vec<f64>,
    pub in_flight: Option<Action>,
}

impl Snapshot {
    pub fn can_afford(&self, id: usize) -> bool {
        self.next_costs.get(id).map_or(false, |&c| c <= self.balance)
    }
}

type Subscriber = Box<dyn FnMut(&Snapshot) + Send>;

struct Inner {
    identity: Option<WalletAddress>,
    engine: EconomyEngine,
    /// Bumped on every persist.
    revision: u64,
}

#[derive(Default)]
struct Listeners {
    list: Vec<Subscriber>,
    publishing: bool,
    /// Latest snapshot raised while `publishing`.
    deferred: Option<Snapshot>,
}

impl Listeners {
    /// Put `batch` back ahead of listeners added during the round.
    fn end_round(&mut self, batch: &mut Vec<Subscriber>) {
        batch.append(&mut self.list);
        self.list = mem::take(batch);
        self.publishing = false;
    }
}

/// Listeners taken out for one publish round. Restores them if a listener
/// panics mid-round.
struct Round<'a> {
    slot: &'a Mutex<Listeners>,
    batch: Vec<Subscriber>,
    finished: bool,
}

impl Drop for Round<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut listeners = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.deferred = None;
            listeners.end_round(&mut self.batch);
        }
    }
}

struct InFlight {
    action: Action,
    due_ms: i64,
}

pub struct Session<S: SaveStore, C: Clock> {
    config: EconomyConfig,
    store: S,
    clock: C,
    inner: RwLock<Inner>,
    in_flight: Mutex<Option<InFlight>>,
    listeners: Mutex<Listeners>,
    saved_revision: Mutex<u64>,
}

impl<S: SaveStore, C: Clock> Session<S, C> {
    /// A disconnected session.
    pub fn new(catalog: Catalog, config: EconomyConfig, store: S, clock: C) -> Self {
        let engine = EconomyEngine::new(catalog, config.min_claim, clock.now_ms());
        Self {
            config,
            store,
            clock,
            inner: RwLock::new(Inner {
                identity: None,
                engine,
                revision: 0,
            }),
            in_flight: Mutex::new(None),
            listeners: Mutex::new(Listeners::default()),
            saved_revision: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Connect `identity` (or a freshly generated one), resuming its save if
    /// the store has one. Replaces any current connection.
    pub fn connect(&self, identity: Option<WalletAddress>) -> Result<WalletAddress, SessionError> {
        let identity = identity.unwrap_or_else(WalletAddress::random);
        let existing = self.store.load(identity.as_str())?;
        let now = self.clock.now_ms();

        {
            let mut inner = self.write();
            let catalog = inner.engine.catalog().clone();
            let mut engine = EconomyEngine::new(catalog.clone(), self.config.min_claim, now);

            let resumed = match existing {
                Some(text) => {
                    let loaded = engine.load_str(&text, now);
                    log_load(&identity, loaded.version, &loaded.quality);
                    loaded.quality != LoadQuality::Discarded
                }
                None => false,
            };

            if !resumed {
                engine = EconomyEngine::fresh(
                    catalog,
                    self.config.min_claim,
                    now,
                    self.config.starter_balance,
                );
                info!(identity = %identity, balance = self.config.starter_balance, "new player");
            } else {
                info!(
                    identity = %identity,
                    balance = engine.state().balance,
                    rate = engine.state().production_rate,
                    "player resumed"
                );
            }

            inner.engine = engine;
            inner.identity = Some(identity.clone());
            self.persist(inner);
        }

        *self.flight() = None;
        self.notify();
        Ok(identity)
    }

    /// Drop the connection and reset to the zero state. The save is kept.
    pub fn disconnect(&self) -> Result<WalletAddress, SessionError> {
        let identity = {
            let mut inner = self.write();
            let identity = inner.identity.take().ok_or(SessionError::NotConnected)?;
            inner.engine.reset(self.clock.now_ms());
            identity
        };
        *self.flight() = None;
        info!(identity = %identity, "disconnected");
        self.notify();
        Ok(identity)
    }

    pub fn is_connected(&self) -> bool {
        self.read().identity.is_some()
    }

    pub fn identity(&self) -> Option<WalletAddress> {
        self.read().identity.clone()
    }

    /// Buy one generator immediately.
    pub fn purchase(&self, id: usize) -> Result<Purchase, SessionError> {
        let (identity, p) = self.mutate(Action::Purchase(id), |engine, _| engine.purchase(id))?;
        info!(
            identity = %identity,
            generator = p.id,
            cost = p.cost,
            count = p.new_count,
            "generator purchased"
        );
        Ok(p)
    }

    /// Claim pending rewards immediately. Returns the amount credited.
    pub fn claim(&self) -> Result<f64, SessionError> {
        let (identity, amount) = self.mutate(Action::Claim, |engine, now| engine.claim(now))?;
        info!(identity = %identity, amount, "rewards claimed");
        Ok(amount)
    }

    pub fn pending_rewards(&self) -> f64 {
        self.read().engine.pending_rewards(self.clock.now_ms())
    }

    pub fn current_cost(&self, id: usize) -> Result<f64, SessionError> {
        Ok(self.read().engine.current_cost(id)?)
    }

    /// Affordable generator with the shortest payback, if any.
    pub fn best_purchase(&self) -> Option<usize> {
        let inner = self.read();
        logic::best_purchase(inner.engine.state(), inner.engine.catalog())
    }

    /// The persisted form of the current state, if connected.
    pub fn save_record(&self) -> Option<SaveRecord> {
        let inner = self.read();
        let identity = inner.identity.as_ref()?;
        Some(inner.engine.save(Some(identity.as_str())))
    }

    /// Queue `action` behind the confirmation delay. Checked now, re-checked
    /// when it settles. Returns the due time.
    pub fn submit(&self, action: Action) -> Result<i64, SessionError> {
        let now = self.clock.now_ms();
        {
            let inner = self.read();
            if inner.identity.is_none() {
                return Err(SessionError::NotConnected);
            }
            match action {
                Action::Purchase(id) => inner.engine.check_purchase(id).map(drop)?,
                Action::Claim => inner.engine.check_claim(now).map(drop)?,
            }
        }

        let due_ms = now.saturating_add(self.config.confirm_delay_ms.max(0));
        {
            let mut slot = self.flight();
            if slot.is_some() {
                return Err(SessionError::Busy);
            }
            *slot = Some(InFlight { action, due_ms });
        }
        debug!(?action, due_ms, "action submitted");
        self.notify();
        Ok(due_ms)
    }

    /// The action awaiting confirmation, if any.
    pub fn in_flight(&self) -> Option<Action> {
        self.flight().as_ref().map(|f| f.action)
    }

    /// Settle the in-flight action if its delay has elapsed.
    pub fn tick(&self) -> Option<Settled> {
        let now = self.clock.now_ms();
        let action = {
            let mut slot = self.flight();
            match slot.as_ref() {
                Some(f) if f.due_ms <= now => slot.take().map(|f| f.action),
                _ => None,
            }
        }?;
        let result = self.settle(action);
        Some(Settled { action, result })
    }

    /// Current view, without notifying anyone.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now_ms();
        let in_flight = self.in_flight();
        let inner = self.read();
        let engine = &inner.engine;
        let state = engine.state();
        Snapshot {
            identity: inner.identity.as_ref().map(|i| i.to_string()),
            at_ms: now,
            balance: state.balance,
            pending_rewards: engine.pending_rewards(now),
            production_rate: state.production_rate,
            total_earned: state.total_earned,
            owned: state.owned.clone(),
            next_costs: engine
                .catalog()
                .iter()
                .map(|g| logic::unit_cost(g, state.owned_count(g.id)))
                .collect(),
            in_flight,
        }
    }

    /// The periodic refresh: recompute the view and push it to subscribers.
    pub fn refresh(&self) -> Snapshot {
        let snapshot = self.snapshot();
        self.publish(&snapshot);
        snapshot
    }

    /// Register a listener called after every change and refresh.
    pub fn subscribe(&self, listener: impl FnMut(&Snapshot) + Send + 'static) {
        self.listeners().list.push(Box::new(listener));
    }

    fn settle(&self, action: Action) -> Result<Outcome, SessionError> {
        match action {
            Action::Purchase(id) => self.purchase(id).map(Outcome::Purchased),
            Action::Claim => self.claim().map(|amount| Outcome::Claimed { amount }),
        }
    }

    /// Apply one engine mutation under the write lock and persist it.
    fn mutate<T>(
        &self,
        action: Action,
        apply: impl FnOnce(&mut EconomyEngine, i64) -> Result<T, EconomyError>,
    ) -> Result<(WalletAddress, T), SessionError> {
        let now = self.clock.now_ms();
        let mut inner = self.write();
        let identity = inner.identity.clone().ok_or(SessionError::NotConnected)?;
        let value = match apply(&mut inner.engine, now) {
            Ok(value) => value,
            Err(e) => {
                debug!(identity = %identity, ?action, error = %e, "action rejected");
                return Err(e.into());
            }
        };
        self.persist(inner);
        self.notify();
        Ok((identity, value))
    }

    /// Serialize under the write lock, release it, then write to the store.
    /// Failures are logged, not returned: the settled mutation stands either way.
    fn persist(&self, mut inner: RwLockWriteGuard<'_, Inner>) {
        let Some(identity) = inner.identity.clone() else {
            return;
        };
        inner.revision += 1;
        let revision = inner.revision;
        let encoded = save::serialize(inner.engine.state(), Some(identity.as_str()));
        drop(inner);

        let mut saved = self.saved_revision.lock().unwrap_or_else(PoisonError::into_inner);
        if *saved > revision {
            debug!(identity = %identity, revision, newer = *saved, "stale save skipped");
            return;
        }
        *saved = revision;
        let result = encoded
            .map_err(StoreError::from)
            .and_then(|json| self.store.save(identity.as_str(), &json));
        if let Err(e) = result {
            warn!(identity = %identity, error = %e, "failed to persist save");
        }
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.publish(&snapshot);
    }

    /// Deliver `snapshot` to every listener. Listeners are moved out of the
    /// lock while they run; a publish raised meanwhile is deferred and
    /// delivered by the round already in progress.
    fn publish(&self, snapshot: &Snapshot) {
        let batch = {
            let mut listeners = self.listeners();
            if listeners.publishing {
                listeners.deferred = Some(snapshot.clone());
                return;
            }
            listeners.publishing = true;
            mem::take(&mut listeners.list)
        };
        let mut round = Round {
            slot: &self.listeners,
            batch,
            finished: false,
        };

        let mut current = snapshot.clone();
        loop {
            for listener in round.batch.iter_mut() {
                listener(&current);
            }
            let mut listeners = self.listeners();
            match listeners.deferred.take() {
                Some(next) => current = next,
                None => {
                    listeners.end_round(&mut round.batch);
                    round.finished = true;
                    return;
                }
            }
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_load(identity: &WalletAddress, version: u32, quality: &LoadQuality) {
    match quality {
        LoadQuality::Clean => debug!(identity = %identity, version, "save loaded"),
        LoadQuality::Repaired(fields) => {
            warn!(identity = %identity, version, ?fields, "save loaded with defaulted fields")
        }
        LoadQuality::Discarded if version < MIN_COMPATIBLE_VERSION => warn!(
            identity = %identity,
            version,
            min_compatible = MIN_COMPATIBLE_VERSION,
            "save unreadable or too old, starting fresh"
        ),
        LoadQuality::Discarded => {
            warn!(identity = %identity, version, "save discarded, starting fresh")
        }
    }
    if version > SAVE_VERSION {
        warn!(identity = %identity, version, current = SAVE_VERSION, "save is from a newer version");
    }
}
