//! # Tuning Module
//!
//! Open-string tunings and fretted shapes for an instrument with an arbitrary
//! number of strings.
//!
//! ## Conventions
//! - String index 0 is the lowest-pitched string
//! - A fret of `-1` mutes the string, `0` plays it open, `n >= 1` adds `n` semitones

use crate::pitch::{NoteName, Pitch};
use serde::{Deserialize, Serialize};

/// Fret value marking a muted string.
pub const MUTED: i32 = -1;
/// Highest fret the fingering editor accepts.
pub const MAX_FRET: i32 = 24;
/// Supported string counts.
pub const MIN_STRINGS: usize = 1;
pub const MAX_STRINGS: usize = 12;
/// Supported octave range for open strings.
pub const MIN_OCTAVE: i32 = 0;
pub const MAX_OCTAVE: i32 = 8;

/// Open pitch of one string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringTuning {
    pub string_index: usize,
    pub pitch: Pitch,
}

/// An ordered set of open strings with unique indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub strings: Vec<StringTuning>,
}

impl Tuning {
    /// Builds a tuning from open pitches, lowest string first.
    pub fn new(name: Option<&str>, pitches: impl IntoIterator<Item = Pitch>) -> Self {
        let strings = pitches
            .into_iter()
            .enumerate()
            .map(|(string_index, pitch)| StringTuning {
                string_index,
                pitch,
            })
            .collect();
        Self {
            name: name.map(str::to_owned),
            strings,
        }
    }

    /// Standard six-string guitar tuning, E2 A2 D3 G3 B3 E4.
    pub fn standard() -> Self {
        Self::new(
            Some("Standard (EADGBE)"),
            [
                Pitch::new(NoteName::E, 2),
                Pitch::new(NoteName::A, 2),
                Pitch::new(NoteName::D, 3),
                Pitch::new(NoteName::G, 3),
                Pitch::new(NoteName::B, 3),
                Pitch::new(NoteName::E, 4),
            ],
        )
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Open pitch for a string index, `None` if the tuning has no such string.
    pub fn open_pitch(&self, string_index: usize) -> Option<&Pitch> {
        // Fast path for the usual contiguous layout.
        match self.strings.get(string_index) {
            Some(string) if string.string_index == string_index => Some(&string.pitch),
            _ => self
                .strings
                .iter()
                .find(|s| s.string_index == string_index)
                .map(|s| &s.pitch),
        }
    }

    /// Sorts strings by index and drops duplicate indices, keeping the first.
    pub fn normalize(&mut self) {
        self.strings.sort_by_key(|s| s.string_index);
        self.strings.dedup_by_key(|s| s.string_index);
    }

    /// Resizes the tuning to `count` strings (clamped to 1..=12).
    ///
    /// Existing strings keep their pitch, new strings start at E2 and indices
    /// are renumbered to 0..count.
    pub fn set_string_count(&mut self, count: usize) {
        let count = count.clamp(MIN_STRINGS, MAX_STRINGS);
        self.normalize();
        self.strings.resize(
            count,
            StringTuning {
                string_index: 0,
                pitch: Pitch::new(NoteName::E, 2),
            },
        );
        for (i, string) in self.strings.iter_mut().enumerate() {
            string.string_index = i;
        }
    }

    pub fn set_note(&mut self, string_index: usize, note: NoteName) {
        if let Some(pitch) = self.pitch_mut(string_index) {
            pitch.note = note;
        }
    }

    pub fn set_octave(&mut self, string_index: usize, octave: i32) {
        if let Some(pitch) = self.pitch_mut(string_index) {
            pitch.octave = octave.clamp(MIN_OCTAVE, MAX_OCTAVE);
        }
    }

    /// Sets a microtuning offset; `0` clears it.
    pub fn set_cents(&mut self, string_index: usize, cents: f64) {
        if let Some(pitch) = self.pitch_mut(string_index) {
            pitch.cents = (cents.is_finite() && cents != 0.0).then_some(cents);
        }
    }

    fn pitch_mut(&mut self, string_index: usize) -> Option<&mut Pitch> {
        self.strings
            .iter_mut()
            .find(|s| s.string_index == string_index)
            .map(|s| &mut s.pitch)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

/// A fretted shape: one fret per string index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingering {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index = string index; -1 = mute, 0 = open, 1..=24 = fret.
    pub frets: Vec<i32>,
}

impl Fingering {
    /// All `strings` strings open.
    pub fn open(strings: usize) -> Self {
        Self {
            name: None,
            frets: vec![0; strings],
        }
    }

    pub fn from_frets(frets: impl IntoIterator<Item = i32>) -> Self {
        Self {
            name: None,
            frets: frets.into_iter().collect(),
        }
    }

    /// Fret for a string; strings without an entry play open.
    pub fn fret(&self, string_index: usize) -> i32 {
        self.frets.get(string_index).copied().unwrap_or(0)
    }

    pub fn is_muted(&self, string_index: usize) -> bool {
        self.fret(string_index) < 0
    }

    /// Sets a fret (clamped to -1..=24), growing the shape with open strings if needed.
    pub fn set_fret(&mut self, string_index: usize, fret: i32) {
        if string_index >= self.frets.len() {
            self.frets.resize(string_index + 1, 0);
        }
        self.frets[string_index] = fret.clamp(MUTED, MAX_FRET);
    }

    pub fn mute(&mut self, string_index: usize) {
        self.set_fret(string_index, MUTED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tuning_is_six_ascending_strings() {
        let tuning = Tuning::standard();
        assert_eq!(tuning.string_count(), 6);
        let midis: Vec<i32> = tuning.strings.iter().map(|s| s.pitch.midi()).collect();
        assert_eq!(midis, vec![40, 45, 50, 55, 59, 64]);
        assert_eq!(tuning.open_pitch(5), Some(&Pitch::new(NoteName::E, 4)));
        assert_eq!(tuning.open_pitch(6), None);
    }

    #[test]
    fn normalize_sorts_and_drops_duplicate_indices() {
        let mut tuning = Tuning {
            name: None,
            strings: vec![
                StringTuning { string_index: 2, pitch: Pitch::new(NoteName::D, 3) },
                StringTuning { string_index: 0, pitch: Pitch::new(NoteName::E, 2) },
                StringTuning { string_index: 2, pitch: Pitch::new(NoteName::G, 3) },
            ],
        };
        tuning.normalize();
        let indices: Vec<usize> = tuning.strings.iter().map(|s| s.string_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(tuning.open_pitch(2), Some(&Pitch::new(NoteName::D, 3)));
        assert_eq!(tuning.open_pitch(1), None);
    }

    #[test]
    fn resizing_keeps_existing_strings() {
        let mut tuning = Tuning::standard();
        tuning.set_string_count(7);
        assert_eq!(tuning.string_count(), 7);
        assert_eq!(tuning.strings[5].pitch, Pitch::new(NoteName::E, 4));
        assert_eq!(tuning.strings[6].string_index, 6);
        assert_eq!(tuning.strings[6].pitch, Pitch::new(NoteName::E, 2));

        tuning.set_string_count(0);
        assert_eq!(tuning.string_count(), 1);
        tuning.set_string_count(40);
        assert_eq!(tuning.string_count(), MAX_STRINGS);
    }

    #[test]
    fn editing_a_string_pitch() {
        let mut tuning = Tuning::standard();
        tuning.set_note(0, NoteName::D);
        tuning.set_octave(0, 12);
        tuning.set_cents(0, -14.0);
        assert_eq!(tuning.strings[0].pitch.note, NoteName::D);
        assert_eq!(tuning.strings[0].pitch.octave, MAX_OCTAVE);
        assert_eq!(tuning.strings[0].pitch.cents, Some(-14.0));
        tuning.set_cents(0, 0.0);
        assert_eq!(tuning.strings[0].pitch.cents, None);
    }

    #[test]
    fn fingering_defaults_and_clamps() {
        let mut fingering = Fingering::open(3);
        assert_eq!(fingering.fret(1), 0);
        assert_eq!(fingering.fret(10), 0);
        fingering.set_fret(1, 99);
        assert_eq!(fingering.fret(1), MAX_FRET);
        fingering.set_fret(2, -7);
        assert!(fingering.is_muted(2));
        fingering.set_fret(5, 3);
        assert_eq!(fingering.frets, vec![0, 24, -1, 0, 0, 3]);
    }
}
