//! Fixed-rate turn clock for the Delve reactor.
//!
//! The server advances in discrete turns. Every turn the reactor drains
//! input, runs the simulation once, and flushes output. [`TurnClock`] paces
//! those turns at a configured rate, numbers them, and keeps [`TurnStats`]
//! on late and skipped turns.
//!
//! # Integration
//!
//! ```ignore
//! let mut clock = TurnClock::new(TurnConfig::with_fps(10));
//! loop {
//!     let turn = clock.wait_for_turn().await;
//!     reactor.run_tick(turn.number, accepted.drain(..));
//!     clock.record_turn_end();
//! }
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the reactor falls behind schedule.
///
/// In JSON: `"skip"` or `{ "burst": { "max": 3 } }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Forget missed turns and schedule the next one a full period from now.
    #[default]
    Skip,
    /// Run up to `max` missed turns back to back, then skip the rest.
    Burst { max: u32 },
}

/// Clock configuration.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Turns per second. Clamped to `1..=MAX_FPS`.
    pub fps: u32,
    pub policy: OverrunPolicy,
    /// Fraction of the turn budget (0.0–1.0) at which a slow turn is logged.
    pub budget_warn_threshold: f64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            policy: OverrunPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl TurnConfig {
    /// Highest supported rate.
    pub const MAX_FPS: u32 = 1000;

    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        if self.fps == 0 || self.fps > Self::MAX_FPS {
            let clamped = self.fps.clamp(1, Self::MAX_FPS);
            warn!(fps = self.fps, clamped, "fps out of range, clamping");
            self.fps = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Length of one turn.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Turn info and stats
// ---------------------------------------------------------------------------

/// Returned by [`TurnClock::wait_for_turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    /// Monotonic turn number, starting at 1.
    pub number: u64,
    /// `true` if this turn started noticeably late.
    pub late: bool,
    /// Turns dropped before this one because of an overrun.
    pub skipped: u64,
}

/// Running counters.
#[derive(Debug, Clone, Default)]
pub struct TurnStats {
    pub turns: u64,
    pub late_turns: u64,
    pub skipped_turns: u64,
    /// Slowest reactor pass seen via [`TurnClock::record_turn_end`].
    pub max_turn_time: Duration,
    /// Last measured fraction of the turn budget used.
    pub last_utilization: f64,
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Paces reactor turns.
pub struct TurnClock {
    config: TurnConfig,
    period: Duration,
    turn: u64,
    next: TokioInstant,
    turn_start: Option<Instant>,
    stats: TurnStats,
}

impl TurnClock {
    pub fn new(config: TurnConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        debug!(
            fps = config.fps,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "turn clock created"
        );
        Self {
            next: TokioInstant::now() + period,
            config,
            period,
            turn: 0,
            turn_start: None,
            stats: TurnStats::default(),
        }
    }

    pub fn with_fps(fps: u32) -> Self {
        Self::new(TurnConfig::with_fps(fps))
    }

    /// Sleeps until the next turn is due and returns it.
    pub async fn wait_for_turn(&mut self) -> Turn {
        let due = self.next;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        self.turn += 1;
        self.turn_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(due);
        let late = late_by > self.period / 10;
        let behind = (late_by.as_nanos() / self.period.as_nanos().max(1)) as u64;
        let mut skipped = 0;

        self.next = match self.config.policy {
            OverrunPolicy::Skip => {
                if late && behind > 0 {
                    skipped = behind;
                    warn!(turn = self.turn, skipped, "reactor behind schedule, skipping turns");
                }
                now + self.period
            }
            OverrunPolicy::Burst { max } => {
                if behind <= u64::from(max) {
                    due + self.period
                } else {
                    skipped = behind - u64::from(max);
                    warn!(turn = self.turn, behind, skipped, "reactor behind schedule, burst capped");
                    now + self.period
                }
            }
        };

        self.stats.turns += 1;
        self.stats.skipped_turns += skipped;
        if late {
            self.stats.late_turns += 1;
        }
        trace!(turn = self.turn, late, "turn");

        Turn {
            number: self.turn,
            late,
            skipped,
        }
    }

    /// Marks the end of the reactor pass for the current turn.
    pub fn record_turn_end(&mut self) {
        let Some(start) = self.turn_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.period.as_secs_f64();
        self.stats.last_utilization = utilization;
        if elapsed > self.stats.max_turn_time {
            self.stats.max_turn_time = elapsed;
        }
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                turn = self.turn,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.period.as_secs_f64() * 1000.0,
                "turn approaching budget limit"
            );
        }
    }

    /// Number of the most recent turn (0 before the first).
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn fps(&self) -> u32 {
        self.config.fps
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &TurnStats {
        &self.stats
    }
}
