//! Fixed-interval ticker for Rookline.
//!
//! One [`Ticker`] drives the shared clock scheduler. Each tick reports how
//! many intervals it stands for, including any that were skipped because
//! the previous tick ran late. Game clocks are charged from their own sync
//! point, so the ticker only sets the cadence and flags overruns.
//!
//! ```ignore
//! let mut ticker = Ticker::new(TickerConfig::every(Duration::from_secs(1)));
//! loop {
//!     let tick = ticker.next_tick().await;
//!     sweep_clocks();
//!     ticker.finish_tick();
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Count the missed ticks and schedule the next one from now.
    #[default]
    Skip,
    /// Keep the original cadence; the missed ticks are not reported.
    Drop,
}

/// Ticker settings.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Time between ticks. Zero is bumped to one millisecond.
    pub interval: Duration,
    pub policy: OverrunPolicy,
    /// Fraction of the interval (0.0–1.0) above which a slow tick is logged.
    pub budget_warn_threshold: f64,
    /// Upper bound for random delay added to the first tick.
    pub initial_jitter: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            policy: OverrunPolicy::default(),
            budget_warn_threshold: 0.80,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickerConfig {
    /// A config ticking every `interval` with default settings.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`Ticker::new`].
    pub fn validated(mut self) -> Self {
        if self.interval.is_zero() {
            warn!("ticker interval is zero, using 1ms");
            self.interval = Duration::from_millis(1);
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One fired tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Starts at 1, increases by one per fired tick.
    pub seq: u64,
    /// The configured interval.
    pub dt: Duration,
    /// Whole intervals that passed without a tick firing.
    pub ticks_skipped: u64,
}

impl Tick {
    /// Wall time this tick accounts for: `dt` times one plus the skipped ticks.
    pub fn elapsed(&self) -> Duration {
        let factor = u32::try_from(self.ticks_skipped.saturating_add(1)).unwrap_or(u32::MAX);
        self.dt.saturating_mul(factor)
    }

    pub fn overran(&self) -> bool {
        self.ticks_skipped > 0
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters updated as ticks fire and finish.
#[derive(Debug, Clone, Default)]
pub struct TickerMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Longest span between `next_tick` returning and `finish_tick`.
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// A fixed-interval ticker built on `tokio::time`.
pub struct Ticker {
    config: TickerConfig,
    seq: u64,
    next_at: TokioInstant,
    work_started: Option<Instant>,
    metrics: TickerMetrics,
}

impl Ticker {
    pub fn new(config: TickerConfig) -> Self {
        let config = config.validated();
        let jitter = jitter(config.initial_jitter);
        let next_at = TokioInstant::now() + config.interval + jitter;

        debug!(
            interval_ms = config.interval.as_millis() as u64,
            policy = ?config.policy,
            "ticker created"
        );

        Self {
            config,
            seq: 0,
            next_at,
            work_started: None,
            metrics: TickerMetrics::default(),
        }
    }

    /// Waits for the next tick.
    pub async fn next_tick(&mut self) -> Tick {
        let interval = self.config.interval;
        let due = self.next_at;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        let late_by = now.saturating_duration_since(due);
        let behind = (late_by.as_nanos() / interval.as_nanos()) as u64;

        self.seq += 1;
        self.work_started = Some(Instant::now());

        let ticks_skipped = match self.config.policy {
            OverrunPolicy::Skip => {
                self.next_at = now + interval;
                behind
            }
            OverrunPolicy::Drop => {
                // Stay on the original grid, past `now`.
                self.next_at = due + interval * (behind as u32 + 1);
                0
            }
        };

        if behind > 0 {
            warn!(
                tick = self.seq,
                behind,
                late_ms = late_by.as_millis() as u64,
                policy = ?self.config.policy,
                "tick overrun"
            );
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;

        trace!(tick = self.seq, ticks_skipped, "tick fired");

        Tick {
            seq: self.seq,
            dt: interval,
            ticks_skipped,
        }
    }

    /// Marks the work for the current tick as done and checks its budget.
    pub fn finish_tick(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let took = started.elapsed();
        if took > self.metrics.max_tick_time {
            self.metrics.max_tick_time = took;
        }

        let utilization = took.as_secs_f64() / self.config.interval.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.seq,
                took_ms = took.as_millis() as u64,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick work approaching interval"
            );
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn metrics(&self) -> &TickerMetrics {
        &self.metrics
    }
}

fn jitter(max: Duration) -> Duration {
    let max_us = max.as_micros() as u64;
    if max_us == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..max_us))
}
