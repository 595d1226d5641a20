//! Step countdown timer
//!
//! Counts a step's duration down at one-second granularity once explicitly
//! started. Reaching zero only changes what the step card shows; the session
//! is never advanced by the timer.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(1);

/// Pure countdown arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    duration: u32,
    remaining: u32,
    started: bool,
}

impl Countdown {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            duration: duration_seconds,
            remaining: duration_seconds,
            started: false,
        }
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.remaining == 0
    }

    /// Returns false if the countdown was already running
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        true
    }

    /// Advance one second. Returns true on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        if !self.started || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }
}

/// Countdown for the current step, driven by the tokio clock
pub struct StepTimer {
    countdown: Countdown,
    remaining_tx: watch::Sender<u32>,
    task: Option<JoinHandle<()>>,
}

impl StepTimer {
    pub fn new(duration_seconds: u32) -> Self {
        let (remaining_tx, _) = watch::channel(duration_seconds);
        Self {
            countdown: Countdown::new(duration_seconds),
            remaining_tx,
            task: None,
        }
    }

    pub fn duration(&self) -> u32 {
        self.countdown.duration()
    }

    /// Remaining seconds as last published by the tick task
    pub fn remaining(&self) -> u32 {
        *self.remaining_tx.borrow()
    }

    pub fn is_started(&self) -> bool {
        self.countdown.is_started()
    }

    pub fn is_finished(&self) -> bool {
        self.is_started() && self.remaining() == 0
    }

    /// Receiver notified on every tick
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining_tx.subscribe()
    }

    /// Start counting down; later calls are ignored
    pub fn start(&mut self) {
        if !self.countdown.start() {
            return;
        }

        let mut countdown = self.countdown;
        let tx = self.remaining_tx.clone();
        let started_at = Instant::now();
        tracing::debug!("Step timer started ({}s)", countdown.duration());

        self.task = Some(tokio::spawn(async move {
            let mut elapsed: u32 = 0;
            while countdown.remaining() > 0 {
                elapsed += 1;
                // Absolute deadlines keep the ticks from drifting
                tokio::time::sleep_until(started_at + TICK * elapsed).await;
                let reached_zero = countdown.tick();
                tx.send_replace(countdown.remaining());
                if reached_zero {
                    tracing::debug!("Step timer reached zero");
                }
            }
        }));
    }

    /// Stop ticking; the displayed value freezes
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Step timer cancelled at {}s", self.remaining());
        }
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
