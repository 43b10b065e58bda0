//! Wall clock and fixed-timestep refresh clock.
//!
//! Economy math runs on epoch milliseconds supplied by a [`Clock`]. The
//! display refresh runs on [`GameTime`], which turns variable frame deltas
//! into a fixed number of discrete ticks per second.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest frame gap fed into the accumulator, in ms.
const MAX_FRAME_DELTA_MS: i64 = 500;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The real wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            // Clock set before 1970.
            Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
        }
    }
}

/// A hand-driven clock. Clones share the same instant.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

/// Fixed-timestep accumulator driving the periodic refresh.
pub struct GameTime {
    ms_per_tick: f64,
    /// Milliseconds fed in but not yet consumed as ticks.
    accumulator: f64,
    pub total_ticks: u64,
    last_ms: Option<i64>,
}

impl GameTime {
    /// `ticks_per_sec`: refresh rate, e.g. 10. Zero is treated as 1.
    pub fn new(ticks_per_sec: u32) -> Self {
        Self {
            ms_per_tick: 1000.0 / ticks_per_sec.max(1) as f64,
            accumulator: 0.0,
            total_ticks: 0,
            last_ms: None,
        }
    }

    /// Feed the current instant; returns how many ticks elapsed since the
    /// previous call. The first call only anchors the clock.
    pub fn update(&mut self, now_ms: i64) -> u32 {
        let delta = match self.last_ms {
            // A backgrounded tab or suspended process must not replay minutes of ticks.
            Some(prev) => now_ms.saturating_sub(prev).clamp(0, MAX_FRAME_DELTA_MS),
            None => 0,
        };
        self.last_ms = Some(now_ms);

        self.accumulator += delta as f64;
        let ticks = (self.accumulator / self.ms_per_tick) as u32;
        self.accumulator -= ticks as f64 * self.ms_per_tick;
        self.total_ticks += ticks as u64;
        ticks
    }

    pub fn ms_per_tick(&self) -> f64 {
        self.ms_per_tick
    }
}
