//! CPR cadence metronome
//!
//! Emits one pulse every `60000 / bpm` milliseconds while playing. Each pulse
//! plays a click on the [`ToneSink`] and lights the visual beat briefly.
//! There is only ever one interval task: pausing aborts it, resuming or
//! changing the tempo replaces it with a fresh one that starts from zero
//! elapsed time.

use crate::sound::ToneSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Visual beat state published to the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeatState {
    /// Pulses emitted since the metronome was created
    pub pulses: u64,
    /// Whether the beat indicator is currently lit
    pub lit: bool,
}

/// Interval between pulses for `bpm` beats per minute
pub fn beat_period(bpm: u32) -> Duration {
    Duration::from_secs(60) / bpm.max(1)
}

pub struct Metronome {
    bpm: u32,
    flash: Duration,
    tone: Arc<dyn ToneSink>,
    beat_tx: watch::Sender<BeatState>,
    task: Option<JoinHandle<()>>,
}

impl Metronome {
    /// Create a paused metronome. `bpm` of zero is treated as one.
    pub fn new(bpm: u32, flash: Duration, tone: Arc<dyn ToneSink>) -> Self {
        let (beat_tx, _) = watch::channel(BeatState::default());
        Self {
            bpm: bpm.max(1),
            flash,
            tone,
            beat_tx,
            task: None,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn period(&self) -> Duration {
        beat_period(self.bpm)
    }

    pub fn is_playing(&self) -> bool {
        self.task.is_some()
    }

    pub fn beat(&self) -> BeatState {
        *self.beat_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BeatState> {
        self.beat_tx.subscribe()
    }

    /// Play/pause toggle. Returns whether the metronome is now playing.
    pub fn toggle(&mut self) -> bool {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
        self.is_playing()
    }

    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        self.spawn_interval();
        tracing::debug!("Metronome playing at {} BPM", self.bpm);
    }

    /// Stop future pulses immediately
    pub fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.beat_tx.send_modify(|beat| beat.lit = false);
            tracing::debug!("Metronome paused");
        }
    }

    /// Change the tempo, rescheduling the interval if playing
    pub fn set_bpm(&mut self, bpm: u32) {
        let bpm = bpm.max(1);
        if bpm == self.bpm {
            return;
        }
        self.bpm = bpm;

        if let Some(task) = self.task.take() {
            task.abort();
            self.spawn_interval();
            tracing::debug!("Metronome rescheduled at {} BPM", bpm);
        }
    }

    fn spawn_interval(&mut self) {
        let period = self.period();
        // The light must go out before the next pulse
        let flash = self.flash.min(period / 2);
        let tone = self.tone.clone();
        let beat_tx = self.beat_tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tone.click();
                beat_tx.send_modify(|beat| {
                    beat.pulses += 1;
                    beat.lit = true;
                });
                tokio::time::sleep(flash).await;
                beat_tx.send_modify(|beat| beat.lit = false);
            }
        }));
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingTone {
        clicks: AtomicU64,
    }

    impl ToneSink for CountingTone {
        fn click(&self) {
            self.clicks.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_ms(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    fn metronome(bpm: u32) -> (Metronome, Arc<CountingTone>) {
        let tone = Arc::new(CountingTone::default());
        let m = Metronome::new(bpm, Duration::from_millis(150), tone.clone());
        (m, tone)
    }

    #[test]
    fn test_beat_period() {
        assert_eq!(beat_period(120), Duration::from_millis(500));
        assert_eq!(beat_period(60), Duration::from_millis(1000));
        assert_eq!(beat_period(100), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_every_500ms_at_120_bpm() {
        let (mut m, tone) = metronome(120);
        m.play();
        settle().await;

        advance_ms(499).await;
        assert_eq!(m.beat().pulses, 0);

        advance_ms(1).await;
        assert_eq!(m.beat().pulses, 1);
        assert!(m.beat().lit);

        advance_ms(150).await;
        assert!(!m.beat().lit);

        for expected in 2..=5 {
            advance_ms(350).await;
            assert_eq!(m.beat().pulses, expected - 1);
            advance_ms(150).await;
            assert_eq!(m.beat().pulses, expected);
        }
        assert_eq!(tone.clicks.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pulses_after_pause() {
        let (mut m, tone) = metronome(120);
        m.play();
        settle().await;
        advance_ms(1000).await;
        assert_eq!(m.beat().pulses, 2);

        m.pause();
        assert!(!m.is_playing());
        advance_ms(5000).await;
        assert_eq!(m.beat().pulses, 2);
        assert_eq!(tone.clicks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_restarts_from_zero() {
        let (mut m, _tone) = metronome(120);
        m.play();
        settle().await;
        advance_ms(400).await;
        m.pause();
        advance_ms(300).await;

        assert!(m.toggle());
        settle().await;
        advance_ms(499).await;
        assert_eq!(m.beat().pulses, 0);
        advance_ms(1).await;
        assert_eq!(m.beat().pulses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tempo_change_uses_new_period_only() {
        let (mut m, _tone) = metronome(120);
        m.play();
        settle().await;
        advance_ms(500).await;
        assert_eq!(m.beat().pulses, 1);

        advance_ms(200).await;
        m.set_bpm(60);
        settle().await;

        // The old 500ms schedule would have fired 300ms from here
        advance_ms(999).await;
        assert_eq!(m.beat().pulses, 1);
        advance_ms(1).await;
        assert_eq!(m.beat().pulses, 2);
        advance_ms(1000).await;
        assert_eq!(m.beat().pulses, 3);
        advance_ms(500).await;
        assert_eq!(m.beat().pulses, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_bpm_while_paused_does_not_start() {
        let (mut m, _tone) = metronome(120);
        m.set_bpm(100);
        assert!(!m.is_playing());
        assert_eq!(m.period(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_tone_sink() {
        let (mut m, tone) = metronome(120);
        m.play();
        settle().await;
        assert!(Arc::strong_count(&tone) >= 2);

        drop(m);
        settle().await;
        assert_eq!(Arc::strong_count(&tone), 1);
    }
}
