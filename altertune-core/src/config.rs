//! Tunable parameters of the scheduling engine.

use crate::pitch::DEFAULT_REFERENCE_A4_HZ;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler and expansion parameters.
///
/// Every field has a default, so a session file may specify any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Polling interval of the scheduler.
    pub lookahead_ms: u64,
    /// How far past "now" each tick schedules. Must exceed `lookahead_ms`.
    pub schedule_ahead_ms: u64,
    /// Spread between successive strings of one event when it sets no `strumMs`.
    pub default_strum_ms: f64,
    /// Fraction of the nominal note length that actually sounds.
    pub length_factor: f64,
    /// Shortest note the expander emits, in seconds.
    pub min_length_sec: f64,
    pub default_length_steps: f64,
    pub default_velocity: f64,
    /// Hard cap on notes produced for a single window.
    pub max_events_per_tick: usize,
    pub reference_a4_hz: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 25,
            schedule_ahead_ms: 100,
            default_strum_ms: 8.0,
            length_factor: 0.95,
            min_length_sec: 0.01,
            default_length_steps: 2.0,
            default_velocity: 0.8,
            max_events_per_tick: 4096,
            reference_a4_hz: DEFAULT_REFERENCE_A4_HZ,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }

    pub fn schedule_ahead_secs(&self) -> f64 {
        self.schedule_ahead_ms as f64 / 1000.0
    }

    /// Rejects settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.lookahead_ms == 0 {
            return Err(anyhow!("lookaheadMs must be positive"));
        }
        if self.schedule_ahead_ms <= self.lookahead_ms {
            return Err(anyhow!(
                "scheduleAheadMs ({}) must be longer than lookaheadMs ({})",
                self.schedule_ahead_ms,
                self.lookahead_ms
            ));
        }
        if !(self.length_factor > 0.0 && self.length_factor < 1.0) {
            return Err(anyhow!("lengthFactor must be in (0, 1), got {}", self.length_factor));
        }
        if self.max_events_per_tick == 0 {
            return Err(anyhow!("maxEventsPerTick must be at least 1"));
        }
        if !(self.reference_a4_hz.is_finite() && self.reference_a4_hz > 0.0) {
            return Err(anyhow!("referenceA4Hz must be positive, got {}", self.reference_a4_hz));
        }
        for (name, value) in [
            ("defaultStrumMs", self.default_strum_ms),
            ("minLengthSec", self.min_length_sec),
            ("defaultLengthSteps", self.default_length_steps),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(anyhow!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if !(0.0..=1.0).contains(&self.default_velocity) {
            return Err(anyhow!("defaultVelocity must be in 0..=1, got {}", self.default_velocity));
        }
        Ok(())
    }
}
