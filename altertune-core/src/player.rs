//! # Player Module
//!
//! Wires the transport to the scheduler: pressing play starts a lookahead
//! scheduler whose windows are filled by the pattern expander from the live
//! session, pressing stop cancels it.

use crate::{
    config::SchedulerConfig,
    expander::{PatternExpander, Window},
    scheduler::{Driver, LookaheadScheduler, SchedulerStats, TickOutcome},
    session::{Session, SharedSession},
    sink::NoteSink,
    timeline::Timeline,
    transport::{TransportEvent, TransportModel},
};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SharedScheduler<T, S> = Arc<Mutex<LookaheadScheduler<T, S>>>;

pub struct Player<T: Timeline + 'static, S: NoteSink + 'static> {
    session: SharedSession,
    transport: TransportModel,
    scheduler: SharedScheduler<T, S>,
    expander: Arc<PatternExpander>,
}

impl<T: Timeline + 'static, S: NoteSink + 'static> Player<T, S> {
    /// A player ticking on its own background thread.
    pub fn new(session: SharedSession, timeline: Arc<T>, sink: S, config: SchedulerConfig) -> Result<Self> {
        Self::with_driver(session, timeline, sink, config, Driver::Thread)
    }

    pub fn with_driver(
        session: SharedSession,
        timeline: Arc<T>,
        sink: S,
        config: SchedulerConfig,
        driver: Driver,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler = Arc::new(Mutex::new(
            LookaheadScheduler::new(timeline, sink, &config).with_driver(driver),
        ));
        let expander = Arc::new(PatternExpander::new(config));
        let mut transport = TransportModel::new(session.clone());

        let listener_scheduler = Arc::clone(&scheduler);
        let listener_session = session.clone();
        let listener_expander = Arc::clone(&expander);
        transport.subscribe(move |event| match event {
            TransportEvent::Started => {
                let provider = window_provider(listener_session.clone(), Arc::clone(&listener_expander));
                lock(&listener_scheduler).start(provider);
            }
            TransportEvent::Stopped => lock(&listener_scheduler).stop(),
            TransportEvent::TempoChanged(bpm) => {
                log::debug!(target: "transport", "New tempo {} BPM applies from the next window", bpm);
            }
        });

        let player = Self {
            session,
            transport,
            scheduler,
            expander,
        };
        // Playback only starts through `play`, so the flag must begin cleared.
        player.session.update(|s| s.transport.playing = false);
        Ok(player)
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn transport(&mut self) -> &mut TransportModel {
        &mut self.transport
    }

    /// Applies an edit to the live session; it is heard from the next tick on.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Session) -> R) -> R {
        self.session.update(edit)
    }

    pub fn play(&mut self) {
        self.transport.set_playing(true);
    }

    pub fn stop(&mut self) {
        self.transport.set_playing(false);
    }

    pub fn toggle(&mut self) -> bool {
        self.transport.toggle()
    }

    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.transport.set_bpm(bpm)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler).is_running()
    }

    /// Drives one scheduler tick; only needed with [`Driver::External`].
    pub fn tick(&self) -> TickOutcome {
        lock(&self.scheduler).tick()
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.scheduler).stats()
    }

    /// Windows truncated by the per-tick note cap so far.
    pub fn cap_hits(&self) -> u64 {
        self.expander.cap_hits()
    }

    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        lock(&self.scheduler).with_sink(f)
    }
}

/// Window provider reading the live session on every window.
///
/// The pattern is anchored at the start of the first window, which is the
/// instant the scheduler started.
fn window_provider(
    session: SharedSession,
    expander: Arc<PatternExpander>,
) -> impl FnMut(Window) -> Vec<crate::ScheduledNote> + Send + 'static {
    let mut pattern_start: Option<f64> = None;
    move |window: Window| {
        let anchor = *pattern_start.get_or_insert(window.start);
        let session = session.read();
        expander.compute_window(window, anchor, &session)
    }
}

fn lock<T: Timeline + 'static, S: NoteSink + 'static>(
    scheduler: &Mutex<LookaheadScheduler<T, S>>,
) -> MutexGuard<'_, LookaheadScheduler<T, S>> {
    scheduler.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScheduledNote, pattern::ArpEvent, timeline::ManualTimeline};

    fn external_player(clock: &ManualTimeline) -> Player<ManualTimeline, Vec<ScheduledNote>> {
        let mut session = Session::default();
        session.transport.bpm = 120.0;
        session.pattern.events = vec![ArpEvent::new(0, [5]), ArpEvent::new(4, [0])];
        Player::with_driver(
            SharedSession::new(session),
            Arc::new(clock.clone()),
            Vec::new(),
            SchedulerConfig::default(),
            Driver::External,
        )
        .unwrap()
    }

    #[test]
    fn play_starts_and_stop_cancels_the_scheduler() {
        let clock = ManualTimeline::new(3.0);
        let mut player = external_player(&clock);
        assert!(!player.is_running());
        player.play();
        assert!(player.is_running());
        assert!(player.session().read().transport.playing);
        player.stop();
        assert!(!player.is_running());
        assert_eq!(player.tick(), TickOutcome::Idle);
    }

    #[test]
    fn pattern_is_anchored_at_play() {
        let clock = ManualTimeline::new(3.0);
        let mut player = external_player(&clock);
        player.play();
        // Tick until 0.6 s after start: step 0 at 3.0 and step 4 at 3.5.
        for _ in 0..20 {
            player.tick();
            clock.advance(0.025);
        }
        let notes = player.with_sink(|sink| sink.clone());
        assert!(notes.len() >= 2);
        assert!((notes[0].time - 3.0).abs() < 1e-9);
        assert!((notes[0].frequency - 329.63).abs() < 0.01);
        assert!((notes[1].time - 3.5).abs() < 1e-9);
    }

    #[test]
    fn edits_are_picked_up_on_the_next_tick() {
        let clock = ManualTimeline::new(0.0);
        let mut player = external_player(&clock);
        player.play();
        player.tick();
        player.edit(|s| s.fingering.mute(0));
        for _ in 0..40 {
            clock.advance(0.025);
            player.tick();
        }
        let low_e = player.with_sink(|sink| sink.iter().filter(|n| n.frequency < 100.0).count());
        assert_eq!(low_e, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SchedulerConfig {
            schedule_ahead_ms: 10,
            ..SchedulerConfig::default()
        };
        let result = Player::new(
            SharedSession::default(),
            Arc::new(ManualTimeline::new(0.0)),
            Vec::<ScheduledNote>::new(),
            config,
        );
        assert!(result.is_err());
    }
}
