//! # Audio Output Module
//!
//! Real-time playback through CPAL (Cross-Platform Audio Library).
//!
//! ## Features
//! - Automatic output device and format selection
//! - A sample-counting clock that doubles as the scheduler's [`Timeline`]
//! - Lock-free note hand-off from the scheduler to the audio callback

use crate::{ScheduledNote, synth::PluckSynth, timeline::Timeline};
use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Preferred output sample rate.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Maximum number of notes waiting for the audio callback.
const NOTE_QUEUE_CAPACITY: usize = 8192;

/// Timeline driven by the number of frames the output stream has rendered.
#[derive(Debug)]
pub struct AudioClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timestamp of the next frame, then moves the clock one frame forward.
    fn advance(&self) -> f64 {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed);
        frame as f64 / self.sample_rate as f64
    }
}

impl Timeline for AudioClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}

/// A running output stream plus the handles the scheduler needs.
pub struct AudioOutput {
    stream: cpal::Stream,
    clock: Arc<AudioClock>,
    notes: Sender<ScheduledNote>,
}

impl AudioOutput {
    /// Shared clock of the stream.
    pub fn timeline(&self) -> Arc<AudioClock> {
        Arc::clone(&self.clock)
    }

    /// A note sink feeding this stream.
    pub fn sink(&self) -> Sender<ScheduledNote> {
        self.notes.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }
}

/// Opens the default output device and starts rendering plucked notes.
///
/// The stream is already playing when this returns, so the clock is running
/// before the first scheduler window is requested.
pub fn start_audio_output() -> Result<AudioOutput> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    log::info!(target: "audio", "Using audio output device: {}", device.name()?);

    let configs = device.supported_output_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 output format found"))?;

    let target = TARGET_SAMPLE_RATE
        .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
    let config = supported_config.with_sample_rate(cpal::SampleRate(target));
    let sample_rate = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();
    let channels = config.channels as usize;

    log::info!(target: "audio", "Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

    let clock = Arc::new(AudioClock::new(sample_rate));
    let (notes_tx, notes_rx) = crossbeam_channel::bounded::<ScheduledNote>(NOTE_QUEUE_CAPACITY);
    let mut synth = PluckSynth::new(sample_rate);
    let render_clock = Arc::clone(&clock);

    let err_fn = |err| log::error!(target: "audio", "An error occurred on the audio stream: {}", err);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for note in notes_rx.try_iter() {
                synth.trigger(note);
            }
            for frame in data.chunks_mut(channels) {
                let sample = synth.next_sample(render_clock.advance());
                frame.fill(sample);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok(AudioOutput {
        stream,
        clock,
        notes: notes_tx,
    })
}

/// Picks an f32 output configuration, preferring mono or stereo and the
/// range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32 && c.channels() >= 1)
        .min_by_key(|c| {
            let covers = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let rate_penalty = if covers { 0 } else { min_diff.min(max_diff) };
            (rate_penalty, c.channels() > 2, c.channels())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_counts_rendered_frames() {
        let clock = AudioClock::new(4);
        assert_eq!(clock.now(), 0.0);
        assert_eq!(clock.advance(), 0.0);
        assert_eq!(clock.advance(), 0.25);
        assert_eq!(clock.now(), 0.5);
    }
}
