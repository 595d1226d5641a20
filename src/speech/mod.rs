//! Speech I/O
//!
//! Two independent, cancellable operations:
//!
//! - **Capture**: a single non-continuous utterance turned into text. At most
//!   one capture is outstanding; [`CaptureSlot`] stops the previous one before
//!   starting another and discards late completions.
//! - **Playback**: text-to-speech through a [`Speaker`], which cancels any
//!   utterance in flight before speaking so the queue never holds more than one.
//!
//! When capture is unavailable the caller falls back to a [`TextPrompt`].

pub mod recognition;
pub mod synthesis;

pub use recognition::{CaptureCompletion, CaptureSlot, SpeechRecognizer, TextPrompt};
pub use synthesis::{Speaker, SpeechSynthesizer, Utterance, Voice};

/// Errors raised by the speech capabilities
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech recognition not supported")]
    NotSupported,

    #[error("No speech detected")]
    NoSpeech,

    #[error("Capture aborted")]
    Aborted,

    #[error("Recognition failed: {0}")]
    Failed(String),
}
