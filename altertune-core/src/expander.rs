//! # Pattern Expansion Module
//!
//! Turns the looping pattern into the concrete notes whose onset falls inside
//! a half-open time window `[start, end)`.
//!
//! Expansion is window-decomposable: expanding two adjacent windows gives the
//! same notes as expanding their union, so a scheduler can walk time in
//! arbitrary slices without gaps or double triggers.

use crate::{
    ScheduledNote,
    config::SchedulerConfig,
    pattern::{ArpEvent, ArpeggioPattern},
    pitch,
    session::Session,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bars are always four beats long.
pub const BEATS_PER_BAR: f64 = 4.0;

/// A half-open interval of timeline seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Same window moved by `offset` seconds.
    pub fn shifted(&self, offset: f64) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }
}

/// Step and cycle lengths derived from a tempo and a pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternTiming {
    pub step: f64,
    pub cycle: f64,
    pub total_steps: u32,
}

impl PatternTiming {
    /// `None` unless bpm, steps per bar and bars describe a finite, positive cycle.
    pub fn derive(bpm: f64, pattern: &ArpeggioPattern) -> Option<Self> {
        if !(bpm.is_finite() && bpm > 0.0) || pattern.steps_per_bar == 0 || pattern.bars == 0 {
            return None;
        }
        let step = (60.0 / bpm) * (BEATS_PER_BAR / pattern.steps_per_bar as f64);
        if !(step.is_finite() && step > 0.0) {
            return None;
        }
        let total_steps = pattern.total_steps();
        let cycle = step * total_steps as f64;
        if !(cycle.is_finite() && cycle > 0.0) {
            return None;
        }
        Some(Self {
            step,
            cycle,
            total_steps,
        })
    }
}

/// Expands patterns into notes with a fixed set of defaults.
#[derive(Debug, Default)]
pub struct PatternExpander {
    config: SchedulerConfig,
    cap_hits: AtomicU64,
}

impl PatternExpander {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cap_hits: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// How many windows were cut short by `max_events_per_tick`.
    pub fn cap_hits(&self) -> u64 {
        self.cap_hits.load(Ordering::Relaxed)
    }

    /// Notes whose event onset lies in `window`, sorted by time.
    ///
    /// `pattern_start` is the instant step 0 of repetition 0 is anchored to.
    /// Unplayable settings (non-positive tempo or cycle, no events) give an
    /// empty result. At most `max_events_per_tick` notes are returned.
    pub fn compute_window(
        &self,
        window: Window,
        pattern_start: f64,
        session: &Session,
    ) -> Vec<ScheduledNote> {
        let pattern = &session.pattern;
        let Some(timing) = PatternTiming::derive(session.transport.bpm, pattern) else {
            return Vec::new();
        };
        if !(window.start < window.end) || !pattern_start.is_finite() {
            return Vec::new();
        }
        let events: Vec<&ArpEvent> = pattern
            .events
            .iter()
            .filter(|ev| ev.step < timing.total_steps)
            .collect();
        if events.is_empty() {
            return Vec::new();
        }

        let cap = self.config.max_events_per_tick;
        let mut notes = Vec::new();
        if cap == 0 {
            return notes;
        }

        let mut k = ((window.start - pattern_start) / timing.cycle).floor();
        if !k.is_finite() {
            k = 0.0;
        }
        // Every repetition visited after the first holds at least one onset.
        // Past `cap + 1` repetitions without reaching the cap, no string sounds
        // and the remaining repetitions would add nothing.
        let mut repetitions = 0usize;
        let mut capped = false;

        'repetitions: loop {
            let base = pattern_start + k * timing.cycle;
            if base >= window.end {
                break;
            }
            repetitions += 1;
            if repetitions > cap + 1 {
                log::trace!(
                    target: "expander",
                    "Window [{:.3}, {:.3}) has no sounding strings past {} repetitions",
                    window.start,
                    window.end,
                    cap + 1
                );
                break;
            }
            for event in &events {
                let onset = base + event.step as f64 * timing.step;
                if !window.contains(onset) {
                    continue;
                }
                if self.expand_event(event, onset, timing.step, session, cap, &mut notes).is_break() {
                    capped = true;
                    break 'repetitions;
                }
            }
            k += 1.0;
        }

        if capped {
            let hits = self.cap_hits.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                target: "expander",
                "Window [{:.3}, {:.3}) truncated at {} notes (cap hit #{})",
                window.start,
                window.end,
                notes.len(),
                hits
            );
        }
        notes.sort_by(|a, b| a.time.total_cmp(&b.time));
        notes
    }

    /// Pushes one note per sounding string of `event`. Breaks once `cap` notes exist.
    fn expand_event(
        &self,
        event: &ArpEvent,
        onset: f64,
        step: f64,
        session: &Session,
        cap: usize,
        notes: &mut Vec<ScheduledNote>,
    ) -> ControlFlow<()> {
        let config = &self.config;
        let spread = event.strum_ms.unwrap_or(config.default_strum_ms).max(0.0) / 1000.0;
        let length_steps = event.length_steps.unwrap_or(config.default_length_steps);
        let length_seconds = (length_steps * step * config.length_factor).max(config.min_length_sec);
        let velocity = event.velocity.unwrap_or(config.default_velocity).clamp(0.0, 1.0);

        for (ordinal, &string_index) in event.strings.iter().enumerate() {
            let fret = session.fingering.fret(string_index);
            if fret < 0 {
                continue;
            }
            let Some(open) = session.tuning.open_pitch(string_index) else {
                continue;
            };
            if notes.len() >= cap {
                return ControlFlow::Break(());
            }
            notes.push(ScheduledNote {
                time: onset + ordinal as f64 * spread,
                frequency: pitch::transposed_freq_with_reference(open, fret, config.reference_a4_hz),
                velocity,
                length_seconds,
            });
        }
        if notes.len() >= cap {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
