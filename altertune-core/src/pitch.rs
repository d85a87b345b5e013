//! # Pitch Module
//!
//! Conversions between note spellings, MIDI note numbers and sounding
//! frequencies in twelve-tone equal temperament.
//!
//! ## Conventions
//! - C4 is MIDI note 60, A4 is MIDI note 69
//! - The reference pitch defaults to A4 = 440 Hz
//! - Cents are applied logarithmically: 100 cents = 1 semitone, 1200 cents = 1 octave

use anyhow::{Error, anyhow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default concert pitch for A4 in Hz.
pub const DEFAULT_REFERENCE_A4_HZ: f64 = 440.0;

/// MIDI note number of A4.
const A4_MIDI: i32 = 69;

/// One of the 17 note spellings a string can be tuned to.
///
/// Enharmonic pairs (`C#`/`Db`, ...) are kept distinct so that a tuning is
/// displayed the way it was written, but they map to the same semitone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteName {
    C,
    #[serde(rename = "C#")]
    CSharp,
    Db,
    D,
    #[serde(rename = "D#")]
    DSharp,
    Eb,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    Gb,
    G,
    #[serde(rename = "G#")]
    GSharp,
    Ab,
    A,
    #[serde(rename = "A#")]
    ASharp,
    Bb,
    B,
}

impl NoteName {
    /// All spellings in chromatic order, sharps before flats.
    pub const ALL: [NoteName; 17] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::Db,
        NoteName::D,
        NoteName::DSharp,
        NoteName::Eb,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::Gb,
        NoteName::G,
        NoteName::GSharp,
        NoteName::Ab,
        NoteName::A,
        NoteName::ASharp,
        NoteName::Bb,
        NoteName::B,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::Db => "Db",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::Eb => "Eb",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::Gb => "Gb",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::Ab => "Ab",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::Bb => "Bb",
            NoteName::B => "B",
        }
    }

    /// Semitone within the octave, 0 (C) to 11 (B).
    pub fn semitone(self) -> i32 {
        note_to_semitone(self)
    }
}

/// Spelling lookup used when parsing note names from text.
static NOTE_NAMES: Lazy<BTreeMap<&'static str, NoteName>> =
    Lazy::new(|| NoteName::ALL.iter().map(|&note| (note.as_str(), note)).collect());

impl FromStr for NoteName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NOTE_NAMES
            .get(s.trim())
            .copied()
            .ok_or_else(|| anyhow!("Unknown note spelling: {:?}", s))
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a note spelling to its semitone (0..=11). Enharmonic spellings share a value.
pub fn note_to_semitone(note: NoteName) -> i32 {
    match note {
        NoteName::C => 0,
        NoteName::CSharp | NoteName::Db => 1,
        NoteName::D => 2,
        NoteName::DSharp | NoteName::Eb => 3,
        NoteName::E => 4,
        NoteName::F => 5,
        NoteName::FSharp | NoteName::Gb => 6,
        NoteName::G => 7,
        NoteName::GSharp | NoteName::Ab => 8,
        NoteName::A => 9,
        NoteName::ASharp | NoteName::Bb => 10,
        NoteName::B => 11,
    }
}

/// A spelled pitch with an optional microtonal offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pitch {
    pub note: NoteName,
    pub octave: i32,
    /// Microtuning offset in cents, added logarithmically to the frequency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cents: Option<f64>,
}

impl Pitch {
    pub const fn new(note: NoteName, octave: i32) -> Self {
        Self {
            note,
            octave,
            cents: None,
        }
    }

    pub fn with_cents(mut self, cents: f64) -> Self {
        self.cents = Some(cents);
        self
    }

    pub fn midi(&self) -> i32 {
        pitch_to_midi(self)
    }

    pub fn frequency(&self) -> f64 {
        pitch_to_freq(self)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note, self.octave)?;
        match self.cents {
            Some(cents) if cents != 0.0 => write!(f, "{:+}c", cents),
            _ => Ok(()),
        }
    }
}

/// Parses "E2", "C#4", "Bb-1" and the like. Cents are not part of the text form.
impl FromStr for Pitch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(|| anyhow!("Missing octave in pitch {:?}", s))?;
        let (name, octave) = s.split_at(split);
        let note = name.parse::<NoteName>()?;
        let octave = octave
            .parse::<i32>()
            .map_err(|e| anyhow!("Invalid octave in pitch {:?}: {}", s, e))?;
        Ok(Pitch::new(note, octave))
    }
}

/// MIDI note number of a pitch, ignoring cents: `(octave + 1) * 12 + semitone`.
pub fn pitch_to_midi(pitch: &Pitch) -> i32 {
    (pitch.octave + 1) * 12 + note_to_semitone(pitch.note)
}

/// Equal-temperament frequency of a MIDI note: `f = A4 * 2^((midi - 69) / 12)`.
pub fn midi_to_freq(midi: i32, reference_a4_hz: f64) -> f64 {
    reference_a4_hz * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Frequency ratio for an offset in cents.
pub fn cents_ratio(cents: f64) -> f64 {
    2.0_f64.powf(cents / 1200.0)
}

/// Sounding frequency of a pitch against A4 = 440 Hz, including its cents offset.
pub fn pitch_to_freq(pitch: &Pitch) -> f64 {
    pitch_to_freq_with_reference(pitch, DEFAULT_REFERENCE_A4_HZ)
}

pub fn pitch_to_freq_with_reference(pitch: &Pitch, reference_a4_hz: f64) -> f64 {
    transposed_freq_with_reference(pitch, 0, reference_a4_hz)
}

/// Frequency of an open string pitch raised by `fret` semitones (A4 = 440 Hz).
pub fn transposed_freq(open: &Pitch, fret: i32) -> f64 {
    transposed_freq_with_reference(open, fret, DEFAULT_REFERENCE_A4_HZ)
}

/// Frequency of an open string pitch raised by `fret` semitones.
///
/// The open string's cents offset carries over to every fret, so a string
/// tuned 14 cents flat stays 14 cents flat along the neck.
pub fn transposed_freq_with_reference(open: &Pitch, fret: i32, reference_a4_hz: f64) -> f64 {
    let freq = midi_to_freq(pitch_to_midi(open) + fret, reference_a4_hz);
    match open.cents {
        Some(cents) if cents != 0.0 => freq * cents_ratio(cents),
        _ => freq,
    }
}
