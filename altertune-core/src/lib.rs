// altertune-core/src/lib.rs

//! The core logic for exploring alternative string tunings.
//! This crate turns a tuning, a fingering and a looping arpeggio pattern
//! into precisely timed plucked notes, and plays them in real time.
//! It is completely headless and contains no UI code.

pub mod audio;
pub mod config;
pub mod expander;
pub mod pattern;
pub mod pitch;
pub mod player;
pub mod presets;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod synth;
pub mod timeline;
pub mod transport;
pub mod tuning;

pub use config::SchedulerConfig;
pub use expander::{PatternExpander, Window};
pub use player::Player;
pub use session::{Session, SessionFile, SharedSession};

/// A single note ready for the audio backend.
///
/// Produced fresh for every scheduling window and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    /// Onset on the shared timeline, in seconds.
    pub time: f64,
    /// Sounding frequency in Hz.
    pub frequency: f64,
    /// Loudness, 0.0 to 1.0.
    pub velocity: f64,
    /// Envelope length in seconds. The backend may ring slightly longer.
    pub length_seconds: f64,
}
