//! Speech capture and the typed-input fallback

use super::SpeechError;
use crate::permissions::Capability;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Single-utterance speech-to-text
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen for one utterance and return its transcript
    async fn capture(&self, language: &str) -> Result<Capability<String>, SpeechError>;

    /// Ask an in-flight capture to finish early
    fn stop(&self);
}

/// Text entry used when speech capture is unavailable
#[async_trait]
pub trait TextPrompt: Send + Sync {
    /// Returns `None` when the user dismisses the prompt
    async fn prompt(&self, message: &str) -> Option<String>;
}

/// Completion of a capture, tagged with the sequence number it was started with
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCompletion {
    pub sequence: u64,
    pub result: Result<Capability<String>, SpeechError>,
}

impl CaptureCompletion {
    /// Non-empty transcript, or the reason there is none
    pub fn transcript(&self) -> Result<String, String> {
        match &self.result {
            Ok(Capability::Supported(text)) if !text.trim().is_empty() => {
                Ok(text.trim().to_string())
            }
            Ok(Capability::Supported(_)) => Err(SpeechError::NoSpeech.to_string()),
            Ok(Capability::Unsupported) => Err(SpeechError::NotSupported.to_string()),
            Ok(Capability::Denied) => Err("Microphone access denied".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Holder of the one outstanding capture
pub struct CaptureSlot {
    recognizer: Arc<dyn SpeechRecognizer>,
    sequence: u64,
    active: Option<JoinHandle<()>>,
}

impl CaptureSlot {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            sequence: 0,
            active: None,
        }
    }

    /// Start a capture, stopping any capture already running
    ///
    /// `on_complete` runs on the capture task with the result. Returns the
    /// sequence number of the new capture.
    pub fn begin<F>(&mut self, language: &str, on_complete: F) -> u64
    where
        F: FnOnce(CaptureCompletion) + Send + 'static,
    {
        self.cancel();

        self.sequence += 1;
        let sequence = self.sequence;
        let recognizer = self.recognizer.clone();
        let language = language.to_string();

        tracing::debug!("Starting speech capture #{}", sequence);
        self.active = Some(tokio::spawn(async move {
            let result = recognizer.capture(&language).await;
            on_complete(CaptureCompletion { sequence, result });
        }));

        sequence
    }

    /// Whether a completion belongs to the most recent capture
    pub fn is_current(&self, sequence: u64) -> bool {
        self.active.is_some() && sequence == self.sequence
    }

    /// Mark the capture with this sequence number as finished
    pub fn finish(&mut self, sequence: u64) {
        if sequence == self.sequence {
            self.active = None;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop and abort the running capture, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            tracing::debug!("Stopping speech capture #{}", self.sequence);
            self.recognizer.stop();
            handle.abort();
        }
    }
}

impl Drop for CaptureSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Recognizer that waits for a transcript pushed by the test
    struct ScriptedRecognizer {
        transcripts: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn capture(&self, _language: &str) -> Result<Capability<String>, SpeechError> {
            let mut rx = self.transcripts.lock().await;
            match rx.recv().await {
                Some(text) => Ok(Capability::Supported(text)),
                None => Err(SpeechError::Aborted),
            }
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted() -> (Arc<ScriptedRecognizer>, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(ScriptedRecognizer {
            transcripts: tokio::sync::Mutex::new(rx),
            stops: AtomicUsize::new(0),
        });
        (recognizer, tx)
    }

    #[tokio::test]
    async fn test_begin_stops_previous_capture() {
        let (recognizer, tx) = scripted();
        let mut slot = CaptureSlot::new(recognizer.clone());
        let completions = Arc::new(Mutex::new(Vec::new()));

        let sink = completions.clone();
        let first = slot.begin("en-US", move |c| sink.lock().push(c));
        let sink = completions.clone();
        let second = slot.begin("en-US", move |c| sink.lock().push(c));

        assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);
        assert!(!slot.is_current(first));
        assert!(slot.is_current(second));

        tx.send("I cut my finger".to_string()).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let completions = completions.lock();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].sequence, second);
        assert_eq!(completions[0].transcript().unwrap(), "I cut my finger");
    }

    #[tokio::test]
    async fn test_finish_clears_active_capture() {
        let (recognizer, _tx) = scripted();
        let mut slot = CaptureSlot::new(recognizer);
        let seq = slot.begin("en-US", |_| {});
        assert!(slot.is_active());

        slot.finish(seq);
        assert!(!slot.is_active());
        assert!(!slot.is_current(seq));
    }

    #[test]
    fn test_completion_transcript_rejects_blank() {
        let blank = CaptureCompletion {
            sequence: 1,
            result: Ok(Capability::Supported("   ".to_string())),
        };
        assert_eq!(blank.transcript(), Err("No speech detected".to_string()));

        let unsupported = CaptureCompletion {
            sequence: 1,
            result: Ok(Capability::Unsupported),
        };
        assert_eq!(
            unsupported.transcript(),
            Err("Speech recognition not supported".to_string())
        );

        let failed = CaptureCompletion {
            sequence: 1,
            result: Err(SpeechError::Failed("network".to_string())),
        };
        assert_eq!(
            failed.transcript(),
            Err("Recognition failed: network".to_string())
        );
    }
}
