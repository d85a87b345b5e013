//! # Arpeggio Pattern Module
//!
//! A loopable step pattern: which strings are plucked on which step of a cycle
//! of `steps_per_bar * bars` steps.

use serde::{Deserialize, Serialize};

pub const MIN_STEPS_PER_BAR: u32 = 2;
pub const MAX_STEPS_PER_BAR: u32 = 64;
pub const MIN_BARS: u32 = 1;
pub const MAX_BARS: u32 = 16;

/// Velocity and length given to cells added with [`ArpeggioPattern::toggle`].
const NEW_EVENT_VELOCITY: f64 = 0.8;
const NEW_EVENT_LENGTH_STEPS: f64 = 2.0;

/// Strings plucked together on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpEvent {
    pub step: u32,
    /// Strings in pluck order; the strum spread follows this order.
    pub strings: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_steps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strum_ms: Option<f64>,
}

impl ArpEvent {
    /// An event with all optional fields left to the scheduler defaults.
    pub fn new(step: u32, strings: impl IntoIterator<Item = usize>) -> Self {
        Self {
            step,
            strings: strings.into_iter().collect(),
            velocity: None,
            length_steps: None,
            strum_ms: None,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_length_steps(mut self, length_steps: f64) -> Self {
        self.length_steps = Some(length_steps);
        self
    }

    pub fn with_strum_ms(mut self, strum_ms: f64) -> Self {
        self.strum_ms = Some(strum_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpeggioPattern {
    pub steps_per_bar: u32,
    pub bars: u32,
    pub events: Vec<ArpEvent>,
}

impl ArpeggioPattern {
    pub fn new(steps_per_bar: u32, bars: u32, events: Vec<ArpEvent>) -> Self {
        Self {
            steps_per_bar,
            bars,
            events,
        }
    }

    /// Number of steps in one cycle.
    pub fn total_steps(&self) -> u32 {
        self.steps_per_bar.saturating_mul(self.bars)
    }

    /// Changes the bar resolution (clamped to 2..=64) and drops events past the new cycle.
    pub fn set_steps_per_bar(&mut self, steps_per_bar: u32) {
        self.steps_per_bar = steps_per_bar.clamp(MIN_STEPS_PER_BAR, MAX_STEPS_PER_BAR);
        self.retain_in_cycle();
    }

    /// Changes the bar count (clamped to 1..=16) and drops events past the new cycle.
    pub fn set_bars(&mut self, bars: u32) {
        self.bars = bars.clamp(MIN_BARS, MAX_BARS);
        self.retain_in_cycle();
    }

    /// Removes events whose step lies outside the cycle. Returns how many were removed.
    pub fn retain_in_cycle(&mut self) -> usize {
        let total = self.total_steps();
        let before = self.events.len();
        self.events.retain(|ev| ev.step < total);
        before - self.events.len()
    }

    /// Whether `string` is plucked on `step`.
    pub fn is_active(&self, step: u32, string: usize) -> bool {
        self.events
            .iter()
            .any(|ev| ev.step == step && ev.strings.contains(&string))
    }

    /// Flips a grid cell.
    ///
    /// Removing the last string of an event removes the event. Adding a string
    /// joins an existing event on the same step, or creates a new one.
    pub fn toggle(&mut self, step: u32, string: usize) {
        if step >= self.total_steps() {
            return;
        }
        if let Some(idx) = self
            .events
            .iter()
            .position(|ev| ev.step == step && ev.strings.contains(&string))
        {
            let event = &mut self.events[idx];
            event.strings.retain(|&s| s != string);
            if event.strings.is_empty() {
                self.events.remove(idx);
            }
        } else if let Some(event) = self.events.iter_mut().find(|ev| ev.step == step) {
            event.strings.push(string);
        } else {
            self.events.push(
                ArpEvent::new(step, [string])
                    .with_velocity(NEW_EVENT_VELOCITY)
                    .with_length_steps(NEW_EVENT_LENGTH_STEPS),
            );
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for ArpeggioPattern {
    /// One bar of 16 steps rolling down from the high E and back up.
    fn default() -> Self {
        let strings = [5, 4, 3, 2, 1, 0, 1, 2];
        let events = strings
            .iter()
            .enumerate()
            .map(|(i, &string)| ArpEvent::new(i as u32 * 2, [string]))
            .collect();
        Self::new(16, 1, events)
    }
}
