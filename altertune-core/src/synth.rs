//! # Pluck Synth Module
//!
//! A small software voice bank that renders scheduled notes sample by sample:
//! triangle oscillator → one-pole low-pass → exponential pluck envelope.
//!
//! Notes are rendered against the same sample clock that the audio backend
//! exposes as its timeline, so a note scheduled for time `t` starts at the
//! first sample whose timestamp is `>= t`.

use crate::ScheduledNote;
use std::f64::consts::PI;

/// Envelope floor; gains never ramp to zero exactly.
const ENVELOPE_FLOOR: f64 = 0.0001;
/// Attack time of the pluck.
const ATTACK_SECS: f64 = 0.005;
/// Extra time a voice keeps running after its envelope has decayed.
pub const RELEASE_TAIL_SECS: f64 = 0.05;
/// Filter cutoff is `min(MAX_CUTOFF_HZ, frequency * CUTOFF_RATIO)`.
const MAX_CUTOFF_HZ: f64 = 12_000.0;
const CUTOFF_RATIO: f64 = 4.0;
/// Voices beyond this count steal the oldest.
pub const MAX_VOICES: usize = 256;
/// Output gain applied to the voice sum.
const MASTER_GAIN: f64 = 0.3;

#[derive(Debug, Clone)]
struct Voice {
    note: ScheduledNote,
    phase: f64,
    filter_state: f64,
    filter_coeff: f64,
}

impl Voice {
    fn new(note: ScheduledNote, sample_rate: f64) -> Self {
        let cutoff = (note.frequency * CUTOFF_RATIO).min(MAX_CUTOFF_HZ);
        Self {
            note,
            phase: 0.0,
            filter_state: 0.0,
            filter_coeff: 1.0 - (-2.0 * PI * cutoff / sample_rate).exp(),
        }
    }

    fn is_finished(&self, t: f64) -> bool {
        t >= self.note.time + self.note.length_seconds + RELEASE_TAIL_SECS
    }

    fn next_sample(&mut self, t: f64, dt: f64) -> f64 {
        let elapsed = t - self.note.time;
        if elapsed < 0.0 {
            return 0.0;
        }
        let triangle = 4.0 * (self.phase - 0.5).abs() - 1.0;
        self.phase = (self.phase + self.note.frequency * dt).fract();
        self.filter_state += self.filter_coeff * (triangle - self.filter_state);
        self.filter_state * envelope(elapsed, self.note.velocity, self.note.length_seconds)
    }
}

/// Pluck envelope: exponential rise to `velocity` over 5 ms, then exponential
/// fall to the floor at `length`, silent afterwards.
pub fn envelope(elapsed: f64, velocity: f64, length: f64) -> f64 {
    let peak = velocity.max(ENVELOPE_FLOOR);
    if elapsed < 0.0 {
        0.0
    } else if elapsed < ATTACK_SECS {
        ENVELOPE_FLOOR * (peak / ENVELOPE_FLOOR).powf(elapsed / ATTACK_SECS)
    } else if elapsed < length && length > ATTACK_SECS {
        let progress = (elapsed - ATTACK_SECS) / (length - ATTACK_SECS);
        peak * (ENVELOPE_FLOOR / peak).powf(progress)
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct PluckSynth {
    sample_rate: f64,
    voices: Vec<Voice>,
}

impl PluckSynth {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            voices: Vec::with_capacity(64),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Queues a note; it sounds once the render clock reaches its time.
    pub fn trigger(&mut self, note: ScheduledNote) {
        if !(note.frequency.is_finite() && note.frequency > 0.0 && note.time.is_finite()) {
            log::debug!(target: "audio", "Ignoring unplayable note {:?}", note);
            return;
        }
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices.push(Voice::new(note, self.sample_rate));
    }

    /// Renders one mono sample at timeline instant `t` and retires finished voices.
    pub fn next_sample(&mut self, t: f64) -> f32 {
        let dt = 1.0 / self.sample_rate;
        let mut mix = 0.0;
        for voice in &mut self.voices {
            mix += voice.next_sample(t, dt);
        }
        self.voices.retain(|v| !v.is_finished(t));
        (mix * MASTER_GAIN).clamp(-1.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(time: f64, length: f64) -> ScheduledNote {
        ScheduledNote {
            time,
            frequency: 440.0,
            velocity: 0.8,
            length_seconds: length,
        }
    }

    #[test]
    fn envelope_peaks_after_attack_and_decays() {
        assert_eq!(envelope(-0.1, 0.8, 0.2), 0.0);
        assert!((envelope(0.0, 0.8, 0.2) - ENVELOPE_FLOOR).abs() < 1e-12);
        assert!((envelope(ATTACK_SECS, 0.8, 0.2) - 0.8).abs() < 1e-9);
        assert!(envelope(0.1, 0.8, 0.2) < 0.8);
        assert_eq!(envelope(0.25, 0.8, 0.2), 0.0);
    }

    #[test]
    fn silent_before_onset_then_sounding() {
        let mut synth = PluckSynth::new(48_000);
        synth.trigger(note(0.01, 0.2));
        let before: f32 = (0..480).map(|i| synth.next_sample(i as f64 / 48_000.0).abs()).sum();
        assert_eq!(before, 0.0);
        let after: f32 = (480..4800).map(|i| synth.next_sample(i as f64 / 48_000.0).abs()).sum();
        assert!(after > 0.0);
    }

    #[test]
    fn voices_are_released_after_the_tail() {
        let mut synth = PluckSynth::new(1_000);
        synth.trigger(note(0.0, 0.1));
        for i in 0..140 {
            synth.next_sample(i as f64 / 1_000.0);
        }
        assert_eq!(synth.active_voices(), 1);
        for i in 140..160 {
            synth.next_sample(i as f64 / 1_000.0);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn voice_count_is_bounded() {
        let mut synth = PluckSynth::new(44_100);
        for i in 0..(MAX_VOICES + 10) {
            synth.trigger(note(i as f64, 1.0));
        }
        assert_eq!(synth.active_voices(), MAX_VOICES);
        synth.trigger(ScheduledNote {
            frequency: f64::NAN,
            ..note(0.0, 1.0)
        });
        assert_eq!(synth.active_voices(), MAX_VOICES);
    }
}
