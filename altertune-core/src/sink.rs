//! Destinations for scheduled notes.

use crate::ScheduledNote;
use crossbeam_channel::{Sender, TrySendError};

/// Something that can make a sound at a future instant of the shared timeline.
pub trait NoteSink: Send {
    /// Start a sound at `time` at `frequency` Hz, loudness `velocity` (0..1),
    /// lasting `length_seconds`.
    fn trigger_note(&mut self, time: f64, frequency: f64, velocity: f64, length_seconds: f64);

    fn deliver(&mut self, note: &ScheduledNote) {
        self.trigger_note(note.time, note.frequency, note.velocity, note.length_seconds);
    }
}

/// Collects notes, mostly useful for offline rendering and tests.
impl NoteSink for Vec<ScheduledNote> {
    fn trigger_note(&mut self, time: f64, frequency: f64, velocity: f64, length_seconds: f64) {
        self.push(ScheduledNote {
            time,
            frequency,
            velocity,
            length_seconds,
        });
    }
}

/// Forwards notes to another thread, typically an audio callback.
/// A full or disconnected channel drops the note.
impl NoteSink for Sender<ScheduledNote> {
    fn trigger_note(&mut self, time: f64, frequency: f64, velocity: f64, length_seconds: f64) {
        let note = ScheduledNote {
            time,
            frequency,
            velocity,
            length_seconds,
        };
        match self.try_send(note) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(target: "audio", "Note queue full, dropping note at {:.3}", time);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!(target: "audio", "Note receiver gone, dropping note at {:.3}", time);
            }
        }
    }
}

impl<S: NoteSink + ?Sized> NoteSink for Box<S> {
    fn trigger_note(&mut self, time: f64, frequency: f64, velocity: f64, length_seconds: f64) {
        (**self).trigger_note(time, frequency, velocity, length_seconds);
    }
}
