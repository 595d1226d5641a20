//! Terminal front-end adapters
//!
//! Stands in for the host capabilities when the controller runs in a
//! terminal: typed lines play the role of captured speech, announcements are
//! printed, and dial-out is logged. A single stdin reader routes each line
//! either to whoever is waiting for an answer (capture or prompt) or to the
//! command stream.

use crate::api::EmergencyApi;
use crate::config::GeolocationConfig;
use crate::contacts::{ContactBook, NewContact, DEFAULT_RADIUS_M};
use crate::dial::{DialError, Dialer};
use crate::permissions::{
    Capability, Coordinates, GeolocationOptions, LocationError, PermissionProvider,
    PermissionState,
};
use crate::session::{SessionPhase, SessionSnapshot};
use crate::speech::{
    SpeechError, SpeechRecognizer, SpeechSynthesizer, TextPrompt, Utterance, Voice,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// Line router over stdin
#[derive(Clone)]
pub struct ConsoleInput {
    waiting: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl ConsoleInput {
    /// Start reading stdin; lines nobody is waiting for arrive on the receiver
    pub fn start() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let input = Self {
            waiting: Arc::new(Mutex::new(None)),
        };

        let waiting = input.waiting.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        let pending = waiting.lock().take();
                        match pending {
                            Some(answer) => {
                                let _ = answer.send(line);
                            }
                            None => {
                                if command_tx.send(line).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            // Dropping the pending sender wakes a waiting reader with `None`
            waiting.lock().take();
        });

        (input, command_rx)
    }

    /// Print `message` and wait for the next line
    ///
    /// Returns `None` when stdin closes or another reader takes over.
    pub async fn ask(&self, message: &str) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        if self.waiting.lock().replace(tx).is_some() {
            tracing::debug!("Replacing an unanswered console question");
        }
        println!("{}", message);
        rx.await.ok()
    }

    /// Abandon the current question, if any
    pub fn cancel(&self) {
        self.waiting.lock().take();
    }
}

/// Treats one typed line as the captured utterance
pub struct ConsoleRecognizer {
    input: ConsoleInput,
}

impl ConsoleRecognizer {
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl SpeechRecognizer for ConsoleRecognizer {
    async fn capture(&self, language: &str) -> Result<Capability<String>, SpeechError> {
        let line = self
            .input
            .ask(&format!("🎤 Listening ({}). Describe what happened:", language))
            .await
            .ok_or(SpeechError::Aborted)?;

        if line.is_empty() {
            return Err(SpeechError::NoSpeech);
        }
        Ok(Capability::Supported(line))
    }

    fn stop(&self) {
        self.input.cancel();
    }
}

/// Typed-input fallback on the same console
pub struct ConsolePrompt {
    input: ConsoleInput,
}

impl ConsolePrompt {
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl TextPrompt for ConsolePrompt {
    async fn prompt(&self, message: &str) -> Option<String> {
        self.input.ask(&format!("⌨️  {}", message)).await
    }
}

/// Prints announcements instead of speaking them
#[derive(Debug, Default)]
pub struct ConsoleSynthesizer;

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            name: "Console".to_string(),
            language: "en-US".to_string(),
        }]
    }

    fn speak(&self, utterance: &Utterance) {
        println!("🔊 {}", utterance.text);
    }

    fn cancel(&self) {}
}

/// Logs the `tel:` URI the host would open
#[derive(Debug, Default)]
pub struct ConsoleDialer;

impl Dialer for ConsoleDialer {
    fn dial(&self, uri: &Url) -> Result<(), DialError> {
        println!("📞 Calling {}", uri.path());
        tracing::warn!("No telephony handler in console mode, would open {}", uri);
        Ok(())
    }
}

/// Permissions for a terminal: no prompts, location from the config file
pub struct ConfigPermissions {
    fixed_location: Option<Coordinates>,
}

impl ConfigPermissions {
    pub fn new(config: &GeolocationConfig) -> Self {
        Self {
            fixed_location: config.fixed_location,
        }
    }
}

#[async_trait]
impl PermissionProvider for ConfigPermissions {
    async fn query_location(&self) -> Capability<PermissionState> {
        match self.fixed_location {
            Some(_) => Capability::Supported(PermissionState::Granted),
            None => Capability::Supported(PermissionState::Denied),
        }
    }

    async fn request_microphone(&self) -> Capability<()> {
        Capability::Supported(())
    }

    async fn request_notifications(&self) -> Capability<PermissionState> {
        Capability::Unsupported
    }

    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Capability<Coordinates>, LocationError> {
        Ok(match self.fixed_location {
            Some(coordinates) => Capability::Supported(coordinates),
            None => Capability::Denied,
        })
    }
}

/// Usage shown on the home screen
pub const HOME_HELP: &str =
    "Commands: <Enter> or sos | contacts | add <phone> <name> | remove <id> | stats | quit";

/// A line typed on the home screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeCommand {
    /// Trigger SOS, or re-check permissions while emergency use is blocked
    Trigger,
    Contacts(ContactCommand),
    Stats,
    Help,
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactCommand {
    List,
    Add { phone: String, name: String },
    Remove(i64),
}

impl HomeCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match (word, rest) {
            ("" | "sos", "") => HomeCommand::Trigger,
            ("contacts", "") => HomeCommand::Contacts(ContactCommand::List),
            ("stats", "") => HomeCommand::Stats,
            ("help", "") => HomeCommand::Help,
            ("quit", "") => HomeCommand::Quit,
            ("add", rest) => match rest.split_once(char::is_whitespace) {
                Some((phone, name)) => HomeCommand::Contacts(ContactCommand::Add {
                    phone: phone.to_string(),
                    name: name.trim().to_string(),
                }),
                None => HomeCommand::Unknown(line.to_string()),
            },
            ("remove", id) => match id.parse() {
                Ok(id) => HomeCommand::Contacts(ContactCommand::Remove(id)),
                Err(_) => HomeCommand::Unknown(line.to_string()),
            },
            _ => HomeCommand::Unknown(line.to_string()),
        }
    }
}

/// Run a contact command and return the lines to print
///
/// New contacts are placed at `location` with the default alert radius.
pub async fn run_contact_command(
    book: &ContactBook,
    command: ContactCommand,
    location: Option<Coordinates>,
) -> Vec<String> {
    match command {
        ContactCommand::List => match book.list().await {
            Ok(contacts) if contacts.is_empty() => vec!["No trusted contacts yet.".to_string()],
            Ok(contacts) => contacts
                .iter()
                .map(|c| {
                    format!(
                        "  #{} {} {} (within {} m)",
                        c.id, c.name, c.phone, c.radius_meters
                    )
                })
                .collect(),
            Err(e) => {
                tracing::error!("Failed to load contacts: {}", e);
                vec![format!("⚠️  Failed to load contacts: {}", e)]
            }
        },
        ContactCommand::Add { phone, name } => {
            let Some(at) = location else {
                return vec![
                    "⚠️  Set geolocation.fixed_location in the config to add contacts".to_string(),
                ];
            };
            let result = match NewContact::new(
                &name,
                &phone,
                at.latitude,
                at.longitude,
                DEFAULT_RADIUS_M,
            ) {
                Ok(contact) => book.add(contact).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(created) => vec![format!("Added #{} {}", created.id, created.name)],
                Err(e) => vec![format!("⚠️  Failed to add contact: {}", e)],
            }
        }
        ContactCommand::Remove(id) => match book.remove(id).await {
            Ok(()) => vec![format!("Removed contact #{}", id)],
            Err(e) => vec![format!("⚠️  Failed to remove contact #{}: {}", id, e)],
        },
    }
}

/// Fetch the triage accuracy report as printable text
pub async fn stats_report(api: &dyn EmergencyApi) -> String {
    match api.learning_stats().await {
        Ok(stats) => stats.render_text(),
        Err(e) => {
            tracing::error!("Failed to fetch learning stats: {}", e);
            format!("⚠️  Failed to load learning stats: {}", e)
        }
    }
}

/// Lines to print for the difference between two session snapshots
pub fn describe_changes(previous: &SessionSnapshot, current: &SessionSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if current.phase != previous.phase {
        lines.push(format!("== {} ==", current.phase.description()));
        if current.phase == SessionPhase::Clarifying {
            if let Some(triage) = &current.triage {
                if let Some(message) = &triage.message {
                    lines.push(message.clone());
                }
                for question in triage.clarifying_questions.iter().flatten() {
                    lines.push(format!("  ? {}", question));
                }
                for candidate in triage.candidate_categories.iter().flatten() {
                    lines.push(format!(
                        "  - {} ({:.0}%)",
                        candidate.category.replace('_', " "),
                        candidate.confidence * 100.0
                    ));
                }
                lines.push("Type more details, or 'speak' to try again.".to_string());
            }
        }
    }

    let step_changed = current.current_step_index != previous.current_step_index
        || (current.current_step.is_some() && previous.current_step.is_none());
    if step_changed {
        if let Some(step) = &current.current_step {
            lines.push(format!(
                "Step {}/{}: {}",
                current.current_step_index + 1,
                current.step_count,
                step.title
            ));
            lines.push(format!("  {}", step.detail));
            if let Some(seconds) = step.timer() {
                lines.push(format!("  ⏱  {} (type 'timer' to start)", clock(seconds)));
            }
            if let Some(bpm) = step.cadence() {
                lines.push(format!("  ♥ {} bpm (type 'metro' to toggle)", bpm));
            }
        }
    }

    if let (Some(timer), false) = (current.timer, step_changed) {
        let before = previous.timer.map(|t| t.remaining_seconds);
        if timer.is_finished() && before != Some(0) {
            lines.push("  ⏱  Time's up".to_string());
        } else if timer.started
            && before != Some(timer.remaining_seconds)
            && timer.remaining_seconds % 10 == 0
        {
            lines.push(format!("  ⏱  {}", clock(timer.remaining_seconds)));
        }
    }

    if let Some(metronome) = current.metronome {
        if previous.metronome.map(|m| m.playing) != Some(metronome.playing) && !step_changed {
            let state = if metronome.playing { "playing" } else { "paused" };
            lines.push(format!("  ♥ Metronome {} at {} bpm", state, metronome.bpm));
        }
    }

    if current.dispatch_triggered && !previous.dispatch_triggered {
        lines.push("Emergency services are being called.".to_string());
    }
    if current.alerts_sent && !previous.alerts_sent {
        lines.push("Emergency contacts alerted.".to_string());
    }
    if let (Some(hospital), None) = (&current.hospital, &previous.hospital) {
        lines.push(format!(
            "Nearest hospital: {}, {} ({:.1} km, ~{} min)",
            hospital.name, hospital.address, hospital.distance_km, hospital.eta_minutes
        ));
    }
    if current.error != previous.error {
        if let Some(error) = &current.error {
            lines.push(format!("⚠️  {}", error));
        }
    }

    lines
}

fn clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
