//! # Lookahead Scheduler Module
//!
//! Polls at a short fixed interval and, on every tick, asks a window provider
//! for the notes between the end of the previous window and `now +
//! schedule_ahead`, handing them to the note sink ahead of time.
//!
//! ## Guarantees
//! - Windows of one running period tile `[start, ∞)` without gaps or overlaps
//! - Nothing before the start instant is ever scheduled
//! - Once [`LookaheadScheduler::stop`] returns, no further note reaches the sink

use crate::{ScheduledNote, config::SchedulerConfig, expander::Window, sink::NoteSink, timeline::Timeline};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Produces the notes for one scheduling window.
pub trait WindowProvider: Send {
    fn notes_in_window(&mut self, window: Window) -> Vec<ScheduledNote>;
}

impl<F> WindowProvider for F
where
    F: FnMut(Window) -> Vec<ScheduledNote> + Send,
{
    fn notes_in_window(&mut self, window: Window) -> Vec<ScheduledNote> {
        self(window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Who calls [`LookaheadScheduler::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Driver {
    /// A background thread ticks every lookahead period.
    #[default]
    Thread,
    /// The embedding event loop calls `tick` itself.
    External,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The scheduler is stopped.
    Idle,
    /// The window would have been empty or reversed; the boundary did not move.
    Skipped,
    Scheduled { window: Window, notes: usize },
}

/// Counters for diagnosing playback problems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub windows: u64,
    pub notes_delivered: u64,
}

struct Inner<S> {
    sink: S,
    provider: Option<Box<dyn WindowProvider>>,
    last_scheduled: Option<f64>,
    stats: SchedulerStats,
}

/// Background ticking thread and the channel that stops it.
struct Worker {
    shutdown_tx: Sender<()>,
    thread_handle: JoinHandle<()>,
}

pub struct LookaheadScheduler<T: Timeline + 'static, S: NoteSink + 'static> {
    timeline: Arc<T>,
    inner: Arc<Mutex<Inner<S>>>,
    lookahead: Duration,
    schedule_ahead: f64,
    driver: Driver,
    worker: Option<Worker>,
}

impl<T: Timeline + 'static, S: NoteSink + 'static> LookaheadScheduler<T, S> {
    pub fn new(timeline: Arc<T>, sink: S, config: &SchedulerConfig) -> Self {
        Self {
            timeline,
            inner: Arc::new(Mutex::new(Inner {
                sink,
                provider: None,
                last_scheduled: None,
                stats: SchedulerStats::default(),
            })),
            lookahead: config.lookahead(),
            schedule_ahead: config.schedule_ahead_secs(),
            driver: Driver::Thread,
            worker: None,
        }
    }

    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    pub fn state(&self) -> SchedulerState {
        if lock(&self.inner).provider.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.inner).stats
    }

    /// End of the last scheduled window, `None` while stopped.
    pub fn last_scheduled_time(&self) -> Option<f64> {
        lock(&self.inner).last_scheduled
    }

    /// Runs `f` with exclusive access to the sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.inner).sink)
    }

    /// Starts a fresh running period anchored at the current timeline instant.
    ///
    /// A scheduler that is already running is stopped first. Returns the start instant.
    pub fn start(&mut self, provider: impl WindowProvider + 'static) -> f64 {
        self.stop();
        let start = self.timeline.now();
        {
            let mut inner = lock(&self.inner);
            inner.provider = Some(Box::new(provider));
            inner.last_scheduled = Some(start);
        }
        log::info!(target: "scheduler", "Scheduler started at {:.3}s", start);

        if self.driver == Driver::Thread {
            self.spawn_worker();
        }
        start
    }

    /// Stops the running period and joins the ticking thread.
    pub fn stop(&mut self) {
        let was_running = {
            let mut inner = lock(&self.inner);
            inner.last_scheduled = None;
            inner.provider.take().is_some()
        };
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            if worker.thread_handle.join().is_err() {
                log::error!(target: "scheduler", "Scheduler thread panicked");
            }
        }
        if was_running {
            log::info!(target: "scheduler", "Scheduler stopped");
        }
    }

    /// Schedules the window between the last boundary and `now + schedule_ahead`.
    pub fn tick(&self) -> TickOutcome {
        tick(&self.inner, self.timeline.now(), self.schedule_ahead)
    }

    fn spawn_worker(&mut self) {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(self.lookahead);
        let inner = Arc::clone(&self.inner);
        let timeline = Arc::clone(&self.timeline);
        let schedule_ahead = self.schedule_ahead;

        let thread_handle = thread::Builder::new()
            .name("altertune-scheduler".into())
            .spawn(move || {
                log::debug!(target: "scheduler", "Scheduler thread running");
                loop {
                    crossbeam_channel::select! {
                        recv(ticker) -> _ => {
                            if tick(&inner, timeline.now(), schedule_ahead) == TickOutcome::Idle {
                                break;
                            }
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                log::debug!(target: "scheduler", "Scheduler thread finished");
            });

        match thread_handle {
            Ok(thread_handle) => {
                self.worker = Some(Worker {
                    shutdown_tx,
                    thread_handle,
                });
            }
            Err(e) => {
                log::error!(target: "scheduler", "Failed to spawn scheduler thread: {}", e);
            }
        }
    }
}

impl<T: Timeline + 'static, S: NoteSink + 'static> Drop for LookaheadScheduler<T, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<S>(inner: &Mutex<Inner<S>>) -> MutexGuard<'_, Inner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The whole tick runs under the lock, so `stop` either waits for an
/// in-flight tick to finish delivering or prevents it from starting.
fn tick<S: NoteSink>(inner: &Mutex<Inner<S>>, now: f64, schedule_ahead: f64) -> TickOutcome {
    let mut guard = lock(inner);
    let Inner {
        sink,
        provider,
        last_scheduled,
        stats,
    } = &mut *guard;
    let Some(provider) = provider.as_mut() else {
        return TickOutcome::Idle;
    };
    stats.ticks += 1;

    let start = last_scheduled.unwrap_or(now);
    let end = now + schedule_ahead;
    if !(end > start) {
        stats.skipped_ticks += 1;
        log::trace!(target: "scheduler", "Skipping tick: window [{}, {}) is empty", start, end);
        return TickOutcome::Skipped;
    }

    let window = Window::new(start, end);
    let mut notes = provider.notes_in_window(window);
    notes.sort_by(|a, b| a.time.total_cmp(&b.time));
    for note in &notes {
        sink.deliver(note);
    }
    *last_scheduled = Some(end);
    stats.windows += 1;
    stats.notes_delivered += notes.len() as u64;
    if !notes.is_empty() {
        log::trace!(
            target: "scheduler",
            "Window [{:.3}, {:.3}) delivered {} notes",
            start,
            end,
            notes.len()
        );
    }
    TickOutcome::Scheduled {
        window,
        notes: notes.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::ManualTimeline;

    fn note_at(time: f64) -> ScheduledNote {
        ScheduledNote {
            time,
            frequency: 440.0,
            velocity: 0.8,
            length_seconds: 0.1,
        }
    }

    fn external(clock: &ManualTimeline) -> LookaheadScheduler<ManualTimeline, Vec<ScheduledNote>> {
        LookaheadScheduler::new(Arc::new(clock.clone()), Vec::new(), &SchedulerConfig::default())
            .with_driver(Driver::External)
    }

    #[test]
    fn stopped_scheduler_is_idle() {
        let clock = ManualTimeline::new(0.0);
        let scheduler = external(&clock);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.tick(), TickOutcome::Idle);
        assert_eq!(scheduler.last_scheduled_time(), None);
    }

    #[test]
    fn windows_tile_time_from_the_start_instant() {
        let clock = ManualTimeline::new(5.0);
        let mut scheduler = external(&clock);
        let windows = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&windows);
        let start = scheduler.start(move |w: Window| {
            seen.lock().unwrap().push(w);
            Vec::<ScheduledNote>::new()
        });
        assert_eq!(start, 5.0);

        for _ in 0..4 {
            scheduler.tick();
            clock.advance(0.025);
        }
        let windows = windows.lock().unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].start, 5.0);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!((windows[3].end - (5.075 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn clock_going_backwards_skips_without_moving_the_boundary() {
        let clock = ManualTimeline::new(1.0);
        let mut scheduler = external(&clock);
        scheduler.start(|_: Window| Vec::<ScheduledNote>::new());
        assert!(matches!(scheduler.tick(), TickOutcome::Scheduled { .. }));
        let boundary = scheduler.last_scheduled_time();

        clock.set(0.5);
        assert_eq!(scheduler.tick(), TickOutcome::Skipped);
        assert_eq!(scheduler.last_scheduled_time(), boundary);
        // Same instant again: the next window would be empty.
        clock.set(1.0);
        assert_eq!(scheduler.tick(), TickOutcome::Skipped);
        assert_eq!(scheduler.stats().skipped_ticks, 2);
    }

    #[test]
    fn notes_reach_the_sink_in_time_order() {
        let clock = ManualTimeline::new(0.0);
        let mut scheduler = external(&clock);
        scheduler.start(|_: Window| vec![note_at(0.05), note_at(0.01), note_at(0.03)]);
        assert_eq!(
            scheduler.tick(),
            TickOutcome::Scheduled {
                window: Window::new(0.0, 0.1),
                notes: 3
            }
        );
        let times = scheduler.with_sink(|sink| sink.iter().map(|n| n.time).collect::<Vec<_>>());
        assert_eq!(times, vec![0.01, 0.03, 0.05]);
        assert_eq!(scheduler.stats().notes_delivered, 3);
    }

    #[test]
    fn stop_clears_the_boundary_and_restart_is_fresh() {
        let clock = ManualTimeline::new(0.0);
        let mut scheduler = external(&clock);
        scheduler.start(|_: Window| Vec::<ScheduledNote>::new());
        scheduler.tick();
        scheduler.stop();
        assert_eq!(scheduler.last_scheduled_time(), None);
        assert_eq!(scheduler.tick(), TickOutcome::Idle);

        clock.set(42.0);
        let windows = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&windows);
        scheduler.start(move |w: Window| {
            seen.lock().unwrap().push(w);
            Vec::<ScheduledNote>::new()
        });
        scheduler.tick();
        assert_eq!(windows.lock().unwrap()[0].start, 42.0);
    }

    #[test]
    fn threaded_driver_ticks_until_stopped() {
        let clock = ManualTimeline::new(0.0);
        let config = SchedulerConfig {
            lookahead_ms: 5,
            schedule_ahead_ms: 20,
            ..SchedulerConfig::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut scheduler = LookaheadScheduler::new(Arc::new(clock.clone()), tx, &config);
        scheduler.start(|w: Window| vec![note_at(w.start)]);

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.time, 0.0);
        scheduler.stop();
        assert!(!scheduler.is_running());

        // Nothing arrives after stop has returned, even with time moving on.
        let _ = rx.try_iter().count();
        clock.advance(1.0);
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_iter().next().is_none());
    }
}
