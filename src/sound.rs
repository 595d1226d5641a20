//! Audible metronome clicks
//!
//! The metronome talks to a [`ToneSink`]. With the `audio` feature the click
//! is rendered to the default output device through cpal; otherwise (or when
//! sounds are disabled, or no device exists) a silent sink is used so the
//! visual beat still runs.

use crate::config::MetronomeConfig;
use std::sync::Arc;
use std::time::Duration;

/// Gain at the start of a click
const CLICK_START_GAIN: f32 = 0.3;

/// Gain the exponential ramp decays to at the end of a click
const CLICK_END_GAIN: f32 = 0.01;

/// Plays one short tone per call, without blocking
pub trait ToneSink: Send + Sync {
    fn click(&self);
}

/// Opens a fresh sink each time a metronome starts
///
/// The metronome owns what this returns, so the output device is held only
/// while a step with a cadence is showing.
pub type ToneFactory = Arc<dyn Fn() -> Arc<dyn ToneSink> + Send + Sync>;

/// Sink that plays nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentTone;

impl ToneSink for SilentTone {
    fn click(&self) {
        tracing::trace!("Metronome click (silent)");
    }
}

/// Click parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration: Duration,
}

impl From<&MetronomeConfig> for ToneSpec {
    fn from(config: &MetronomeConfig) -> Self {
        Self {
            frequency_hz: config.tone_frequency_hz,
            duration: Duration::from_millis(config.tone_duration_ms),
        }
    }
}

/// Render a sine click with an exponential gain ramp
pub fn synthesize_click(spec: &ToneSpec, sample_rate: u32) -> Vec<f32> {
    let len = (spec.duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
    if len == 0 {
        return Vec::new();
    }

    let ratio = CLICK_END_GAIN / CLICK_START_GAIN;
    let step = std::f32::consts::TAU * spec.frequency_hz / sample_rate as f32;

    (0..len)
        .map(|i| {
            let progress = i as f32 / len as f32;
            let gain = CLICK_START_GAIN * ratio.powf(progress);
            gain * (step * i as f32).sin()
        })
        .collect()
}

/// Pick the tone sink for the current configuration
pub fn tone_sink(config: &MetronomeConfig) -> Arc<dyn ToneSink> {
    if !config.play_sounds {
        tracing::debug!("Metronome sounds disabled");
        return Arc::new(SilentTone);
    }

    #[cfg(feature = "audio")]
    {
        match output::CpalTonePlayer::open(ToneSpec::from(config)) {
            Ok(player) => return Arc::new(player),
            Err(e) => {
                tracing::warn!("No audio output for metronome, clicks will be silent: {}", e);
            }
        }
    }

    Arc::new(SilentTone)
}

/// Writes the click into interleaved output buffers, one sample per frame
/// copied to every channel, silence once the click has run out
#[cfg(any(feature = "audio", test))]
struct ClickCursor {
    click: Vec<f32>,
    channels: usize,
    position: Option<usize>,
}

#[cfg(any(feature = "audio", test))]
impl ClickCursor {
    fn new(click: Vec<f32>, channels: usize) -> Self {
        Self {
            click,
            channels: channels.max(1),
            position: None,
        }
    }

    fn restart(&mut self) {
        self.position = Some(0);
    }

    fn fill<T: Copy>(&mut self, data: &mut [T], convert: impl Fn(f32) -> T) {
        for frame in data.chunks_mut(self.channels) {
            let sample = match self.position {
                Some(i) if i < self.click.len() => {
                    self.position = Some(i + 1);
                    self.click[i]
                }
                _ => {
                    self.position = None;
                    0.0
                }
            };
            let converted = convert(sample);
            for out in frame.iter_mut() {
                *out = converted;
            }
        }
    }
}

/// Factory that opens [`tone_sink`] on demand with this configuration
pub fn tone_factory(config: &MetronomeConfig) -> ToneFactory {
    let config = config.clone();
    Arc::new(move || tone_sink(&config))
}

#[cfg(feature = "audio")]
pub use output::CpalTonePlayer;

#[cfg(feature = "audio")]
mod output {
    use super::{synthesize_click, ClickCursor, ToneSink, ToneSpec};
    use anyhow::{anyhow, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    /// Click player on the default output device
    ///
    /// The cpal stream lives on a dedicated thread; dropping the player closes
    /// the command channel, which ends the thread and releases the device.
    pub struct CpalTonePlayer {
        trigger: Arc<AtomicBool>,
        // Dropped first so the stream thread wakes up
        shutdown: Option<mpsc::Sender<()>>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl CpalTonePlayer {
        #[allow(deprecated)] // cpal 0.17 deprecates name()
        pub fn open(spec: ToneSpec) -> Result<Self> {
            let trigger = Arc::new(AtomicBool::new(false));
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

            let callback_trigger = trigger.clone();
            let thread = std::thread::spawn(move || {
                let stream = match build_stream(spec, callback_trigger) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Blocks until the player is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("Metronome output stream closed");
            });

            ready_rx
                .recv()
                .map_err(|_| anyhow!("Audio thread exited during setup"))??;

            Ok(Self {
                trigger,
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            })
        }
    }

    #[allow(deprecated)]
    fn build_stream(spec: ToneSpec, trigger: Arc<AtomicBool>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device available"))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported_config = device.default_output_config()?;
        // cpal 0.17 returns u32 directly
        let sample_rate = supported_config.sample_rate();
        let channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();

        tracing::info!(
            "Metronome output: device='{}', {}Hz, {} channels, format={:?}",
            device_name,
            sample_rate,
            channels,
            sample_format
        );

        let cursor = ClickCursor::new(synthesize_click(&spec, sample_rate), channels);
        let config: cpal::StreamConfig = supported_config.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_typed_stream::<f32>(&device, &config, cursor, trigger)?,
            SampleFormat::I16 => build_typed_stream::<i16>(&device, &config, cursor, trigger)?,
            SampleFormat::U16 => build_typed_stream::<u16>(&device, &config, cursor, trigger)?,
            SampleFormat::I32 => build_typed_stream::<i32>(&device, &config, cursor, trigger)?,
            other => return Err(anyhow!("Unsupported output sample format: {:?}", other)),
        };

        stream.play()?;
        Ok(stream)
    }

    fn build_typed_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut cursor: ClickCursor,
        trigger: Arc<AtomicBool>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if trigger.swap(false, Ordering::AcqRel) {
                    cursor.restart();
                }
                cursor.fill(data, <T as Sample>::from_sample);
            },
            |err| {
                tracing::error!("Metronome output stream error: {}", err);
            },
            None,
        )?;
        Ok(stream)
    }

    impl ToneSink for CpalTonePlayer {
        fn click(&self) {
            self.trigger.store(true, Ordering::Release);
        }
    }

    impl Drop for CpalTonePlayer {
        fn drop(&mut self) {
            self.shutdown.take();
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    tracing::error!("Metronome audio thread panicked");
                }
            }
        }
    }
}
