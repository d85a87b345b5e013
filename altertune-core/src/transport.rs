//! # Transport Module
//!
//! Tempo and play/stop state, plus the observer hook that lets playback
//! follow the transport.

use crate::session::SharedSession;
use serde::{Deserialize, Serialize};

pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    pub bpm: f64,
    pub playing: bool,
    /// Stored with the session; not applied by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<f64>,
    /// Stored with the session; not applied by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humanize_ms: Option<f64>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            bpm: 100.0,
            playing: false,
            swing: None,
            humanize_ms: None,
        }
    }
}

/// Clamps a tempo the way the transport control does: rounded to a whole
/// BPM in 30..=300, with 120 for non-finite or non-positive input.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if !(bpm.is_finite() && bpm > 0.0) {
        return DEFAULT_BPM;
    }
    bpm.round().clamp(MIN_BPM, MAX_BPM)
}

/// Notifications sent to transport observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    Started,
    Stopped,
    TempoChanged(f64),
}

type Listener = Box<dyn FnMut(TransportEvent) + Send>;

/// Edits the transport part of a shared session and notifies observers.
///
/// Observers run synchronously, after the session lock has been released.
pub struct TransportModel {
    session: SharedSession,
    listeners: Vec<Listener>,
}

impl TransportModel {
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(TransportEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> TransportState {
        self.session.read().transport.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.session.read().transport.playing
    }

    /// Sets the tempo (see [`clamp_bpm`]); takes effect from the next scheduled window.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let bpm = clamp_bpm(bpm);
        let changed = self.session.update(|s| {
            let changed = s.transport.bpm != bpm;
            s.transport.bpm = bpm;
            changed
        });
        if changed {
            log::debug!(target: "transport", "Tempo set to {} BPM", bpm);
            self.emit(TransportEvent::TempoChanged(bpm));
        }
        bpm
    }

    /// Returns `true` if the state actually changed. Observers only hear about real transitions.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        let changed = self.session.update(|s| {
            let changed = s.transport.playing != playing;
            s.transport.playing = playing;
            changed
        });
        if changed {
            log::info!(target: "transport", "{}", if playing { "Play" } else { "Stop" });
            self.emit(if playing {
                TransportEvent::Started
            } else {
                TransportEvent::Stopped
            });
        }
        changed
    }

    /// Flips play/stop and returns the new state.
    pub fn toggle(&mut self) -> bool {
        let playing = !self.is_playing();
        self.set_playing(playing);
        playing
    }

    fn emit(&mut self, event: TransportEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_model() -> (TransportModel, Arc<Mutex<Vec<TransportEvent>>>) {
        let mut model = TransportModel::new(SharedSession::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        model.subscribe(move |ev| sink.lock().unwrap().push(ev));
        (model, events)
    }

    #[test]
    fn bpm_is_rounded_and_clamped() {
        assert_eq!(clamp_bpm(99.6), 100.0);
        assert_eq!(clamp_bpm(5.0), MIN_BPM);
        assert_eq!(clamp_bpm(1000.0), MAX_BPM);
        assert_eq!(clamp_bpm(f64::NAN), DEFAULT_BPM);
        assert_eq!(clamp_bpm(0.0), DEFAULT_BPM);
        assert_eq!(clamp_bpm(-10.0), DEFAULT_BPM);
        assert_eq!(clamp_bpm(f64::NEG_INFINITY), DEFAULT_BPM);
    }

    #[test]
    fn observers_only_see_transitions() {
        let (mut model, events) = recording_model();
        assert!(model.set_playing(true));
        assert!(!model.set_playing(true));
        assert!(!model.toggle());
        assert!(model.toggle());
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                TransportEvent::Started,
                TransportEvent::Stopped,
                TransportEvent::Started
            ]
        );
    }

    #[test]
    fn tempo_changes_are_written_to_the_session() {
        let session = SharedSession::default();
        let mut model = TransportModel::new(session.clone());
        assert_eq!(model.set_bpm(133.2), 133.0);
        assert_eq!(session.read().transport.bpm, 133.0);
        assert_eq!(model.state().bpm, 133.0);
    }

    #[test]
    fn unchanged_tempo_is_not_announced() {
        let (mut model, events) = recording_model();
        let bpm = model.state().bpm;
        model.set_bpm(bpm);
        assert!(events.lock().unwrap().is_empty());
        model.set_bpm(bpm + 1.0);
        assert_eq!(*events.lock().unwrap(), vec![TransportEvent::TempoChanged(bpm + 1.0)]);
    }
}
