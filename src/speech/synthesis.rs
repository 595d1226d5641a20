//! Text-to-speech playback

use crate::config::SpeechConfig;
use crate::permissions::Capability;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A voice offered by the synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub language: String,
}

/// A single utterance handed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<Voice>,
}

/// Host speech synthesis
pub trait SpeechSynthesizer: Send + Sync {
    fn is_supported(&self) -> bool;

    fn voices(&self) -> Vec<Voice>;

    /// Queue an utterance for playback
    fn speak(&self, utterance: &Utterance);

    /// Drop the utterance being spoken and anything queued
    fn cancel(&self);
}

/// Speech output with at most one utterance in flight
#[derive(Clone)]
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: SpeechConfig,
}

impl Speaker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: SpeechConfig) -> Self {
        Self {
            synthesizer,
            settings,
        }
    }

    /// Cancel whatever is playing, then speak `text`
    pub fn speak(&self, text: &str) -> Capability<()> {
        if !self.synthesizer.is_supported() {
            tracing::debug!("Speech synthesis unsupported, skipping announcement");
            return Capability::Unsupported;
        }

        self.synthesizer.cancel();

        let utterance = Utterance {
            text: text.to_string(),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            volume: self.settings.volume,
            voice: self.preferred_voice(),
        };

        tracing::debug!("Speaking: {}", text);
        self.synthesizer.speak(&utterance);
        Capability::Supported(())
    }

    /// Cancel any speech in flight
    pub fn stop(&self) {
        if self.synthesizer.is_supported() {
            self.synthesizer.cancel();
        }
    }

    fn preferred_voice(&self) -> Option<Voice> {
        let voices = self.synthesizer.voices();
        self.settings.preferred_voices.iter().find_map(|fragment| {
            voices
                .iter()
                .find(|voice| voice.name.contains(fragment.as_str()))
                .cloned()
        })
    }
}
