//! Recording fakes for the host capabilities and the emergency service.

#![allow(dead_code)]

use async_trait::async_trait;
use mediassist_lib::api::{
    AlertReceipt, AlertRequest, ApiError, EmergencyApi, HospitalInfo, IncidentId, Step,
    TriageRequest, TriageResult,
};
use mediassist_lib::config::SpeechConfig;
use mediassist_lib::contacts::{Contact, NewContact};
use mediassist_lib::dial::{DialError, Dialer};
use mediassist_lib::launch::IncidentLaunch;
use mediassist_lib::learning::LearningStats;
use mediassist_lib::permissions::{
    Capability, Coordinates, GeolocationOptions, LocationError, PermissionProvider,
    PermissionState,
};
use mediassist_lib::session::{
    IncidentSession, SessionDeps, SessionHandle, SessionOutcome, SessionSettings,
};
use mediassist_lib::sound::{ToneFactory, ToneSink};
use mediassist_lib::speech::{
    Speaker, SpeechError, SpeechRecognizer, SpeechSynthesizer, TextPrompt, Utterance, Voice,
};
use mediassist_lib::summary::{SummaryDocument, SummaryFormat};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// =============================================================================
// Emergency service
// =============================================================================

#[derive(Default)]
pub struct FakeApi {
    triage_script: Mutex<VecDeque<Result<TriageResult, String>>>,
    pub triage_requests: Mutex<Vec<TriageRequest>>,
    pub created: Mutex<Vec<Coordinates>>,
    pub events: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<AlertRequest>>,
    pub hospital_lookups: AtomicUsize,
    pub resolved: Mutex<Vec<IncidentId>>,
    pub fail_side_effects: bool,
    pub contacts: Mutex<Vec<Contact>>,
    /// Contact calls are rejected as if the token had expired
    pub signed_out: bool,
    pub stats: Mutex<Option<LearningStats>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts, hospital lookup, event logging and resolve all fail
    pub fn failing_side_effects() -> Self {
        Self {
            fail_side_effects: true,
            ..Self::default()
        }
    }

    pub fn signed_out() -> Self {
        Self {
            signed_out: true,
            ..Self::default()
        }
    }

    pub fn push_triage(&self, result: TriageResult) {
        self.triage_script.lock().push_back(Ok(result));
    }

    pub fn push_triage_error(&self, message: &str) {
        self.triage_script.lock().push_back(Err(message.to_string()));
    }

    pub fn event_log(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn check_session(&self) -> Result<(), ApiError> {
        if self.signed_out {
            Err(ApiError::Unauthorized("Unable to verify token".to_string()))
        } else {
            Ok(())
        }
    }

    fn side_effect_failure(&self) -> Result<(), ApiError> {
        if self.fail_side_effects {
            Err(ApiError::ConnectionFailed("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn hospital() -> HospitalInfo {
    HospitalInfo {
        name: "Buffalo General Medical Center".to_string(),
        address: "100 High St, Buffalo, NY".to_string(),
        distance_km: 2.4,
        eta_minutes: 7,
        directions_url: "https://maps.example/dir".to_string(),
    }
}

#[async_trait]
impl EmergencyApi for FakeApi {
    async fn triage(&self, request: &TriageRequest) -> Result<TriageResult, ApiError> {
        self.triage_requests.lock().push(request.clone());
        let next = self.triage_script.lock().pop_front();
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(ApiError::ServerError {
                status: 500,
                message,
            }),
            None => Err(ApiError::ConnectionFailed("no triage scripted".to_string())),
        }
    }

    async fn create_incident(&self, at: Coordinates) -> Result<IncidentId, ApiError> {
        let mut created = self.created.lock();
        created.push(at);
        Ok(IncidentId(created.len() as i64))
    }

    async fn log_event(
        &self,
        _incident: IncidentId,
        step_description: &str,
        _metadata: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.events.lock().push(step_description.to_string());
        self.side_effect_failure()
    }

    async fn send_alerts(&self, request: &AlertRequest) -> Result<AlertReceipt, ApiError> {
        self.alerts.lock().push(request.clone());
        self.side_effect_failure()?;
        Ok(AlertReceipt {
            ok: true,
            count: 2,
            contacts_notified: vec!["Ann".to_string(), "Ben".to_string()],
        })
    }

    async fn nearest_hospital(&self, _at: Coordinates) -> Result<HospitalInfo, ApiError> {
        self.hospital_lookups.fetch_add(1, Ordering::SeqCst);
        self.side_effect_failure()?;
        Ok(hospital())
    }

    async fn resolve_incident(&self, incident: IncidentId) -> Result<(), ApiError> {
        self.resolved.lock().push(incident);
        self.side_effect_failure()
    }

    async fn incident_summary(
        &self,
        _incident: IncidentId,
        _format: SummaryFormat,
    ) -> Result<SummaryDocument, ApiError> {
        Ok(SummaryDocument::Text {
            summary: "INCIDENT SUMMARY".to_string(),
        })
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        self.check_session()?;
        Ok(self.contacts.lock().clone())
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, ApiError> {
        self.check_session()?;
        let mut contacts = self.contacts.lock();
        let id = contacts.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let created = Contact {
            id,
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            latitude: contact.latitude,
            longitude: contact.longitude,
            radius_meters: contact.radius_meters,
        };
        contacts.push(created.clone());
        Ok(created)
    }

    async fn delete_contact(&self, contact_id: i64) -> Result<(), ApiError> {
        self.check_session()?;
        let mut contacts = self.contacts.lock();
        let before = contacts.len();
        contacts.retain(|c| c.id != contact_id);
        if contacts.len() == before {
            return Err(ApiError::ServerError {
                status: 404,
                message: "Contact not found".to_string(),
            });
        }
        Ok(())
    }

    async fn learning_stats(&self) -> Result<LearningStats, ApiError> {
        self.stats.lock().clone().ok_or_else(|| ApiError::ServerError {
            status: 500,
            message: "Failed to get stats".to_string(),
        })
    }
}

// =============================================================================
// Speech
// =============================================================================

/// Recognizer answering from a script; listens forever once it runs out
#[derive(Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<Capability<String>, SpeechError>>>,
    pub captures: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn hearing(transcript: &str) -> Self {
        let recognizer = Self::default();
        recognizer.push(Ok(Capability::Supported(transcript.to_string())));
        recognizer
    }

    pub fn failing(error: SpeechError) -> Self {
        let recognizer = Self::default();
        recognizer.push(Err(error));
        recognizer
    }

    pub fn push(&self, outcome: Result<Capability<String>, SpeechError>) {
        self.script.lock().push_back(outcome);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn capture(&self, _language: &str) -> Result<Capability<String>, SpeechError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSynth {
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
}

impl RecordingSynth {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.spoken.lock().last().cloned()
    }
}

impl SpeechSynthesizer for RecordingSynth {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn speak(&self, utterance: &Utterance) {
        self.spoken.lock().push(utterance.text.clone());
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Prompt answering from a script; cancels once it runs out
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<String>>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn answering(answer: &str) -> Self {
        let prompt = Self::default();
        prompt.answers.lock().push_back(Some(answer.to_string()));
        prompt
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl TextPrompt for ScriptedPrompt {
    async fn prompt(&self, message: &str) -> Option<String> {
        self.asked.lock().push(message.to_string());
        self.answers.lock().pop_front().flatten()
    }
}

// =============================================================================
// Dial-out and sound
// =============================================================================

#[derive(Default)]
pub struct RecordingDialer {
    pub calls: Mutex<Vec<(String, Instant)>>,
}

impl RecordingDialer {
    pub fn numbers(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(uri, _)| uri.clone()).collect()
    }
}

impl Dialer for RecordingDialer {
    fn dial(&self, uri: &url::Url) -> Result<(), DialError> {
        self.calls.lock().push((uri.to_string(), Instant::now()));
        Ok(())
    }
}

/// Hands out sinks that share one click counter and track how many are alive
#[derive(Default)]
pub struct CountingTone {
    pub clicks: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
}

impl CountingTone {
    pub fn count(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> ToneFactory {
        let tone = self.clone();
        Arc::new(move || -> Arc<dyn ToneSink> {
            tone.opened.fetch_add(1, Ordering::SeqCst);
            tone.live.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingSink {
                clicks: tone.clicks.clone(),
                live: tone.live.clone(),
            })
        })
    }
}

struct CountingSink {
    clicks: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl ToneSink for CountingSink {
    fn click(&self) {
        self.clicks.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for CountingSink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Permissions
// =============================================================================

pub struct StaticPermissions {
    pub location: Capability<PermissionState>,
    pub microphone: Capability<()>,
    pub position: Result<Capability<Coordinates>, LocationError>,
}

impl StaticPermissions {
    pub fn granted() -> Self {
        Self {
            location: Capability::Supported(PermissionState::Granted),
            microphone: Capability::Supported(()),
            position: Ok(Capability::Supported(buffalo())),
        }
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn query_location(&self) -> Capability<PermissionState> {
        self.location.clone()
    }

    async fn request_microphone(&self) -> Capability<()> {
        self.microphone.clone()
    }

    async fn request_notifications(&self) -> Capability<PermissionState> {
        Capability::Supported(PermissionState::Granted)
    }

    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Capability<Coordinates>, LocationError> {
        self.position.clone()
    }
}

pub fn buffalo() -> Coordinates {
    Coordinates::new(42.9634, -78.7384)
}

// =============================================================================
// Triage results
// =============================================================================

pub fn step(title: &str, detail: &str) -> Step {
    Step {
        title: title.to_string(),
        detail: detail.to_string(),
        timer_seconds: None,
        cadence_bpm: None,
    }
}

pub fn triage(category: &str, dispatch: bool, steps: Vec<Step>) -> TriageResult {
    TriageResult {
        category: category.to_string(),
        severity_level: if dispatch { "critical" } else { "low" }.to_string(),
        requires_immediate_dispatch: dispatch,
        dispatch_number: None,
        supplies_needed: vec!["gauze".to_string(), "bandage".to_string()],
        instruction_steps: steps,
        clarifying_questions: None,
        candidate_categories: None,
        message: None,
    }
}

pub fn minor_cut() -> TriageResult {
    triage(
        "minor_cut",
        false,
        vec![
            step("Wash the wound", "Rinse under clean running water"),
            step("Apply pressure", "Press a clean gauze pad on the cut"),
            step("Cover", "Apply a bandage"),
        ],
    )
}

// =============================================================================
// Session harness
// =============================================================================

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub synth: Arc<RecordingSynth>,
    pub dialer: Arc<RecordingDialer>,
    pub prompt: Arc<ScriptedPrompt>,
    pub tone: Arc<CountingTone>,
    pub handle: SessionHandle,
    pub task: JoinHandle<SessionOutcome>,
}

impl Harness {
    pub fn start(api: FakeApi, recognizer: ScriptedRecognizer, prompt: ScriptedPrompt) -> Self {
        let api = Arc::new(api);
        let recognizer = Arc::new(recognizer);
        let synth = Arc::new(RecordingSynth::default());
        let dialer = Arc::new(RecordingDialer::default());
        let prompt = Arc::new(prompt);
        let tone = Arc::new(CountingTone::default());

        let deps = SessionDeps {
            api: api.clone(),
            recognizer: recognizer.clone(),
            speaker: Speaker::new(synth.clone(), SpeechConfig::default()),
            dialer: dialer.clone(),
            prompt: prompt.clone(),
            tone: tone.factory(),
        };
        let launch = IncidentLaunch {
            incident_id: IncidentId(42),
            coordinates: buffalo(),
        };

        let (session, handle) = IncidentSession::new(launch, deps, SessionSettings::default());
        let task = tokio::spawn(session.run());

        Self {
            api,
            recognizer,
            synth,
            dialer,
            prompt,
            tone,
            handle,
            task,
        }
    }
}

/// Poll `condition` on the tokio clock until it holds
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
