//! Incident session controller
//!
//! Runs one session: consumes the inbound event channel, feeds events to the
//! [`IncidentStateMachine`] and performs the effects of each transition.
//! Speech capture, the text prompt and every network call run as tasks that
//! report back through the same channel, so transitions happen strictly in
//! the order their events arrive.

use super::state::{
    DispatchPolicy, Effect, IncidentStateMachine, SessionEvent, SessionPhase, SessionState,
};
use super::triage::infer_age_group;
use crate::api::{
    AlertReceipt, AlertRequest, ApiError, EmergencyApi, HospitalInfo, IncidentId, Step,
    TriageRequest, TriageResult,
};
use crate::config::{MetronomeConfig, SessionConfig};
use crate::dial::{self, Dialer};
use crate::launch::IncidentLaunch;
use crate::metronome::Metronome;
use crate::permissions::Coordinates;
use crate::sound::ToneFactory;
use crate::speech::{CaptureCompletion, CaptureSlot, Speaker, SpeechRecognizer, TextPrompt};
use crate::timer::StepTimer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Collaborators a session talks to
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn EmergencyApi>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub speaker: Speaker,
    pub dialer: Arc<dyn Dialer>,
    pub prompt: Arc<dyn TextPrompt>,
    /// Called once per metronome; the sink lives as long as that metronome
    pub tone: ToneFactory,
}

/// Per-session settings taken from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub locale: String,
    pub recognition_language: String,
    pub dispatch: DispatchPolicy,
    pub alert_radius_m: u32,
    pub beat_flash: Duration,
}

impl SessionSettings {
    pub fn from_config(session: &SessionConfig, metronome: &MetronomeConfig) -> Self {
        Self {
            locale: session.locale.clone(),
            recognition_language: session.recognition_language.clone(),
            dispatch: DispatchPolicy {
                default_number: session.default_dispatch_number.clone(),
                delay: session.dispatch_delay(),
            },
            alert_radius_m: session.alert_radius_m,
            beat_flash: Duration::from_millis(metronome.beat_flash_ms),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default(), &MetronomeConfig::default())
    }
}

/// Countdown shown on the current step card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerView {
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub started: bool,
}

impl TimerView {
    pub fn is_finished(&self) -> bool {
        self.started && self.remaining_seconds == 0
    }
}

/// Metronome controls shown on the current step card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetronomeView {
    pub bpm: u32,
    pub playing: bool,
}

/// What the incident screen renders
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub incident_id: IncidentId,
    pub phase: SessionPhase,
    pub transcript: String,
    pub triage: Option<TriageResult>,
    pub current_step_index: usize,
    pub step_count: usize,
    pub current_step: Option<Step>,
    pub timer: Option<TimerView>,
    pub metronome: Option<MetronomeView>,
    pub alerts_sent: bool,
    pub dispatch_triggered: bool,
    pub hospital: Option<HospitalInfo>,
    pub error: Option<String>,
}

impl SessionSnapshot {
    fn capture(
        session_id: Uuid,
        incident_id: IncidentId,
        state: &SessionState,
        widgets: &StepWidgets,
    ) -> Self {
        Self {
            session_id,
            incident_id,
            phase: state.phase,
            transcript: state.transcript.clone(),
            triage: state.current_triage.clone(),
            current_step_index: state.current_step_index,
            step_count: state.step_count(),
            current_step: state.current_step().cloned(),
            timer: widgets.timer.as_ref().map(|timer| TimerView {
                duration_seconds: timer.duration(),
                remaining_seconds: timer.remaining(),
                started: timer.is_started(),
            }),
            metronome: widgets.metronome.as_ref().map(|metronome| MetronomeView {
                bpm: metronome.bpm(),
                playing: metronome.is_playing(),
            }),
            alerts_sent: state.alerts_sent,
            dispatch_triggered: state.dispatch_triggered,
            hospital: state.hospital_info.clone(),
            error: state.last_error.clone(),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user ended the session; the summary for this incident comes next
    Resolved { incident_id: IncidentId },
    /// Torn down before it was resolved
    Abandoned {
        incident_id: IncidentId,
        phase: SessionPhase,
    },
}

impl SessionOutcome {
    pub fn incident_id(&self) -> IncidentId {
        match self {
            SessionOutcome::Resolved { incident_id }
            | SessionOutcome::Abandoned { incident_id, .. } => *incident_id,
        }
    }
}

/// Messages on the session's inbound channel
#[derive(Debug)]
enum Inbound {
    Event(SessionEvent),
    Capture(CaptureCompletion),
    PromptAnswered(Option<String>),
    TriageFinished(Result<TriageResult, ApiError>),
    AlertsSent(AlertReceipt),
    HospitalFound(HospitalInfo),
    StartTimer,
    ToggleMetronome,
    TimerTick,
    Teardown,
}

/// Weak sender handed to background tasks
///
/// Tasks never keep a session alive; once every [`SessionHandle`] is gone
/// their reports are dropped.
#[derive(Clone)]
struct Reporter(mpsc::WeakUnboundedSender<Inbound>);

impl Reporter {
    fn send(&self, message: Inbound) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

/// Timer and metronome of the current step
#[derive(Default)]
struct StepWidgets {
    index: Option<usize>,
    timer: Option<StepTimer>,
    metronome: Option<Metronome>,
}

impl StepWidgets {
    fn clear(&mut self) {
        if let Some(index) = self.index.take() {
            tracing::debug!("Releasing widgets of step {}", index);
        }
        // Dropping cancels the countdown and the pulse task
        self.timer = None;
        self.metronome = None;
    }
}

/// One emergency-guidance session
pub struct IncidentSession {
    session_id: Uuid,
    incident_id: IncidentId,
    location: Coordinates,
    settings: SessionSettings,
    deps: SessionDeps,
    machine: IncidentStateMachine,
    capture: CaptureSlot,
    widgets: StepWidgets,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    reporter: Reporter,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Delayed dials and the resolve call, awaited before `run` returns
    pending: Vec<JoinHandle<()>>,
    resolved: bool,
}

impl IncidentSession {
    /// Create a session for a freshly created incident
    ///
    /// The session runs until it is resolved, torn down, or every returned
    /// handle has been dropped.
    pub fn new(
        launch: IncidentLaunch,
        deps: SessionDeps,
        settings: SessionSettings,
    ) -> (Self, SessionHandle) {
        let session_id = Uuid::new_v4();
        let (tx, inbound_rx) = mpsc::unbounded_channel();
        let machine = IncidentStateMachine::new(settings.dispatch.clone());
        let widgets = StepWidgets::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::capture(
            session_id,
            launch.incident_id,
            machine.state(),
            &widgets,
        ));

        let session = Self {
            session_id,
            incident_id: launch.incident_id,
            location: launch.coordinates,
            capture: CaptureSlot::new(deps.recognizer.clone()),
            settings,
            deps,
            machine,
            widgets,
            inbound_rx,
            reporter: Reporter(tx.downgrade()),
            snapshot_tx,
            pending: Vec::new(),
            resolved: false,
        };
        let handle = SessionHandle {
            session_id,
            tx,
            snapshot_rx,
        };
        (session, handle)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Drive the session to completion
    pub async fn run(mut self) -> SessionOutcome {
        let span = tracing::info_span!(
            "incident_session",
            session_id = %self.session_id,
            incident_id = %self.incident_id
        );

        async move {
            tracing::info!(
                "Incident session started at ({:.5}, {:.5})",
                self.location.latitude,
                self.location.longitude
            );
            self.handle(Inbound::Event(SessionEvent::Start));

            while !self.resolved {
                match self.inbound_rx.recv().await {
                    Some(Inbound::Teardown) => {
                        tracing::info!("Session torn down");
                        break;
                    }
                    Some(message) => self.handle(message),
                    None => {
                        tracing::info!("All session handles dropped");
                        break;
                    }
                }
            }

            self.finish().await
        }
        .instrument(span)
        .await
    }

    fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Event(event) => self.process(event),
            Inbound::Capture(completion) => self.on_capture(completion),
            Inbound::PromptAnswered(answer) => {
                let event = match answer.filter(|text| !text.trim().is_empty()) {
                    Some(text) => SessionEvent::TextSubmitted { text },
                    None => SessionEvent::PromptCancelled,
                };
                self.process(event);
            }
            Inbound::TriageFinished(Ok(result)) => {
                self.process(SessionEvent::TriageSucceeded { result })
            }
            Inbound::TriageFinished(Err(e)) => {
                tracing::error!("Triage request failed: {}", e);
                self.process(SessionEvent::TriageFailed {
                    error: e.to_string(),
                });
            }
            Inbound::AlertsSent(receipt) => {
                if receipt.ok {
                    self.machine.record_alerts_sent(&receipt);
                } else {
                    tracing::warn!("Alert service reported failure");
                }
            }
            Inbound::HospitalFound(info) => self.machine.record_hospital(info),
            Inbound::StartTimer => self.start_timer(),
            Inbound::ToggleMetronome => self.toggle_metronome(),
            Inbound::TimerTick | Inbound::Teardown => {}
        }
        self.publish();
    }

    fn on_capture(&mut self, completion: CaptureCompletion) {
        if !self.capture.is_current(completion.sequence) {
            tracing::debug!("Ignoring stale capture #{}", completion.sequence);
            return;
        }
        self.capture.finish(completion.sequence);

        let event = match completion.transcript() {
            Ok(transcript) => SessionEvent::CaptureSucceeded { transcript },
            Err(error) => {
                tracing::warn!("Speech capture failed: {}", error);
                SessionEvent::CaptureFailed { error }
            }
        };
        self.process(event);
    }

    fn process(&mut self, event: SessionEvent) {
        let name = event.name();
        match self.machine.process_event(event) {
            Some(transition) => {
                for effect in transition.effects {
                    self.perform(effect);
                }
            }
            None => tracing::debug!("Ignoring {} in {:?}", name, self.machine.phase()),
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture => {
                let reporter = self.reporter.clone();
                self.capture
                    .begin(&self.settings.recognition_language, move |completion| {
                        reporter.send(Inbound::Capture(completion));
                    });
            }
            Effect::CancelCapture => self.capture.cancel(),
            Effect::PromptForText { message } => {
                let prompt = self.deps.prompt.clone();
                let reporter = self.reporter.clone();
                tokio::spawn(
                    async move {
                        let answer = prompt.prompt(&message).await;
                        reporter.send(Inbound::PromptAnswered(answer));
                    }
                    .in_current_span(),
                );
            }
            Effect::RequestTriage { text } => self.request_triage(text),
            Effect::Announce { text } => {
                self.deps.speaker.speak(&text);
            }
            Effect::StopSpeech => self.deps.speaker.stop(),
            Effect::Dial { number, delay } => self.dial(number, delay),
            Effect::SendAlerts { message } => self.send_alerts(message),
            Effect::LookupHospital => self.lookup_hospital(),
            Effect::LogEvent {
                description,
                metadata,
            } => self.log_event(description, metadata),
            Effect::PrepareStep { index } => self.prepare_step(index),
            Effect::ClearStep => self.widgets.clear(),
            Effect::ShowError { message } => tracing::error!("{}", message),
            Effect::ResolveIncident => self.resolve_incident(),
            Effect::NavigateToSummary => {
                tracing::info!("Incident {} resolved", self.incident_id);
                self.resolved = true;
            }
        }
    }

    fn request_triage(&self, text: String) {
        let request = TriageRequest {
            age_group: infer_age_group(&text),
            text,
            locale: self.settings.locale.clone(),
            latitude: Some(self.location.latitude),
            longitude: Some(self.location.longitude),
        };
        let api = self.deps.api.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(
            async move {
                let result = api.triage(&request).await;
                reporter.send(Inbound::TriageFinished(result));
            }
            .in_current_span(),
        );
    }

    fn dial(&mut self, number: String, delay: Duration) {
        let dialer = self.deps.dialer.clone();
        if delay.is_zero() {
            dial::dial_number(dialer.as_ref(), &number);
            return;
        }
        // Lets the announcement start first; not cancelled by teardown
        let task = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                dial::dial_number(dialer.as_ref(), &number);
            }
            .in_current_span(),
        );
        self.track(task);
    }

    fn send_alerts(&self, message: String) {
        let request = AlertRequest {
            incident_id: self.incident_id,
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            message,
            radius_meters: self.settings.alert_radius_m,
        };
        let api = self.deps.api.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(
            async move {
                match api.send_alerts(&request).await {
                    Ok(receipt) => {
                        reporter.send(Inbound::AlertsSent(receipt));
                    }
                    Err(e) => tracing::warn!("Failed to send alerts: {}", e),
                }
            }
            .in_current_span(),
        );
    }

    fn lookup_hospital(&self) {
        let api = self.deps.api.clone();
        let reporter = self.reporter.clone();
        let location = self.location;
        tokio::spawn(
            async move {
                match api.nearest_hospital(location).await {
                    Ok(info) => {
                        reporter.send(Inbound::HospitalFound(info));
                    }
                    Err(e) => tracing::warn!("Failed to get hospital: {}", e),
                }
            }
            .in_current_span(),
        );
    }

    fn log_event(&self, description: String, metadata: Option<serde_json::Value>) {
        let api = self.deps.api.clone();
        let incident = self.incident_id;
        tokio::spawn(
            async move {
                if let Err(e) = api
                    .log_event(incident, &description, metadata.as_ref())
                    .await
                {
                    tracing::warn!("Failed to log event {:?}: {}", description, e);
                }
            }
            .in_current_span(),
        );
    }

    fn resolve_incident(&mut self) {
        let api = self.deps.api.clone();
        let incident = self.incident_id;
        let task = tokio::spawn(
            async move {
                if let Err(e) = api.resolve_incident(incident).await {
                    tracing::warn!("Failed to resolve incident {}: {}", incident, e);
                }
            }
            .in_current_span(),
        );
        self.track(task);
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.pending.retain(|task| !task.is_finished());
        self.pending.push(task);
    }

    /// Replace the timer and metronome with those of step `index`
    fn prepare_step(&mut self, index: usize) {
        self.widgets.clear();

        let Some(step) = self
            .machine
            .state()
            .current_triage
            .as_ref()
            .and_then(|triage| triage.instruction_steps.get(index))
            .cloned()
        else {
            return;
        };

        let timer = step.timer().map(|seconds| {
            let timer = StepTimer::new(seconds);
            self.forward_ticks(&timer);
            timer
        });
        let metronome = step
            .cadence()
            .map(|bpm| Metronome::new(bpm, self.settings.beat_flash, (self.deps.tone)()));

        self.widgets = StepWidgets {
            index: Some(index),
            timer,
            metronome,
        };
    }

    /// Republish the snapshot on every countdown tick
    fn forward_ticks(&self, timer: &StepTimer) {
        let mut ticks = timer.subscribe();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            while ticks.changed().await.is_ok() {
                if !reporter.send(Inbound::TimerTick) {
                    break;
                }
            }
        });
    }

    fn start_timer(&mut self) {
        match self.widgets.timer.as_mut() {
            Some(timer) if self.machine.phase() == SessionPhase::GuidedSteps => timer.start(),
            _ => tracing::debug!("No timer on the current step"),
        }
    }

    fn toggle_metronome(&mut self) {
        match self.widgets.metronome.as_mut() {
            Some(metronome) if self.machine.phase() == SessionPhase::GuidedSteps => {
                let playing = metronome.toggle();
                tracing::info!(
                    "Metronome {} at {} BPM",
                    if playing { "started" } else { "paused" },
                    metronome.bpm()
                );
            }
            _ => tracing::debug!("No metronome on the current step"),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot::capture(
            self.session_id,
            self.incident_id,
            self.machine.state(),
            &self.widgets,
        ));
    }

    async fn finish(mut self) -> SessionOutcome {
        self.capture.cancel();
        self.widgets.clear();

        let outcome = if self.resolved {
            SessionOutcome::Resolved {
                incident_id: self.incident_id,
            }
        } else {
            self.deps.speaker.stop();
            SessionOutcome::Abandoned {
                incident_id: self.incident_id,
                phase: self.machine.phase(),
            }
        };

        self.publish();

        if !self.pending.is_empty() {
            tracing::debug!("Waiting for {} background task(s)", self.pending.len());
        }
        for task in std::mem::take(&mut self.pending) {
            if let Err(e) = task.await {
                tracing::error!("Session background task failed: {}", e);
            }
        }

        tracing::info!("Incident session finished: {:?}", outcome);
        outcome
    }
}

/// User actions on a running session
///
/// Every action is queued on the session's inbound channel and returns
/// `false` once the session has finished.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Inbound>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until a snapshot matches `predicate`
    ///
    /// Returns `None` if the session finishes first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| (*snapshot).clone());
        snapshot
    }

    fn send(&self, message: Inbound) -> bool {
        let sent = self.tx.send(message).is_ok();
        if !sent {
            tracing::debug!("Session {} already finished", self.session_id);
        }
        sent
    }

    /// Capture speech again (after a failed capture or for clarification)
    pub fn speak_again(&self) -> bool {
        self.send(Inbound::Event(SessionEvent::SpeakAgain))
    }

    /// Submit a typed description or clarification
    pub fn type_input(&self, text: impl Into<String>) -> bool {
        self.send(Inbound::Event(SessionEvent::TextSubmitted { text: text.into() }))
    }

    pub fn next_step(&self) -> bool {
        self.send(Inbound::Event(SessionEvent::NextStep))
    }

    pub fn start_timer(&self) -> bool {
        self.send(Inbound::StartTimer)
    }

    pub fn toggle_metronome(&self) -> bool {
        self.send(Inbound::ToggleMetronome)
    }

    /// Call emergency services now
    pub fn call_dispatch(&self) -> bool {
        self.send(Inbound::Event(SessionEvent::CallDispatch))
    }

    pub fn end_session(&self) -> bool {
        self.send(Inbound::Event(SessionEvent::EndSession))
    }

    /// Leave the incident screen without resolving
    pub fn teardown(&self) -> bool {
        self.send(Inbound::Teardown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let session = SessionConfig {
            dispatch_delay_ms: 1500,
            default_dispatch_number: "112".to_string(),
            alert_radius_m: 800,
            ..Default::default()
        };
        let metronome = MetronomeConfig {
            beat_flash_ms: 90,
            ..Default::default()
        };

        let settings = SessionSettings::from_config(&session, &metronome);
        assert_eq!(settings.dispatch.default_number, "112");
        assert_eq!(settings.dispatch.delay, Duration::from_millis(1500));
        assert_eq!(settings.alert_radius_m, 800);
        assert_eq!(settings.beat_flash, Duration::from_millis(90));
        assert_eq!(settings.recognition_language, "en-US");
    }

    #[test]
    fn test_timer_view_finished() {
        let view = TimerView {
            duration_seconds: 30,
            remaining_seconds: 0,
            started: false,
        };
        assert!(!view.is_finished());
        assert!(TimerView {
            started: true,
            ..view
        }
        .is_finished());
    }

    #[test]
    fn test_outcome_incident_id() {
        let outcome = SessionOutcome::Abandoned {
            incident_id: IncidentId(9),
            phase: SessionPhase::Capturing,
        };
        assert_eq!(outcome.incident_id(), IncidentId(9));
    }
}
