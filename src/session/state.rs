//! Incident session state machine
//!
//! Defines the phases of one emergency-guidance session and the transitions
//! between them. The machine is pure: it never performs I/O. Each accepted
//! event yields a [`Transition`] listing the effects the controller must carry
//! out, in order.

use super::triage::{self, Branch};
use crate::api::{AlertReceipt, HospitalInfo, Step, TriageResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spoken when the critical path is entered
pub const CRITICAL_ANNOUNCEMENT: &str =
    "Critical emergency detected. Calling emergency services now.";

/// Shown by the text fallback when speech capture fails
pub const TEXT_FALLBACK_MESSAGE: &str =
    "What happened? (Voice recognition failed, please type):";

/// Shown when asking for a typed clarification
pub const CLARIFICATION_PROMPT: &str = "Please type your response:";

/// Phase of an incident session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing captured yet, or waiting after a failed capture
    #[default]
    Idle,
    /// A speech capture is in flight
    Capturing,
    /// A triage request is in flight
    Triaging,
    /// The service needs more information
    Clarifying,
    /// Dispatch required; status cards only, no step list
    CriticalPath,
    /// Walking through the instruction steps
    GuidedSteps,
    /// Session ended by the user
    Resolved,
}

impl SessionPhase {
    /// Returns a human-readable description of the phase
    pub fn description(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Starting emergency session",
            SessionPhase::Capturing => "Listening",
            SessionPhase::Triaging => "Analyzing emergency",
            SessionPhase::Clarifying => "Need more information",
            SessionPhase::CriticalPath => "Critical emergency",
            SessionPhase::GuidedSteps => "First-aid steps",
            SessionPhase::Resolved => "Session ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Resolved)
    }

    /// Whether the session can be ended from this phase
    pub fn can_end(&self) -> bool {
        matches!(self, SessionPhase::GuidedSteps | SessionPhase::CriticalPath)
    }
}

/// Events fed into the state machine
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Incident screen opened
    Start,
    /// Speech capture produced a transcript
    CaptureSucceeded { transcript: String },
    /// Speech capture failed or was unsupported
    CaptureFailed { error: String },
    /// User typed a description or clarification
    TextSubmitted { text: String },
    /// User dismissed the text prompt without typing anything
    PromptCancelled,
    /// User asked to speak again
    SpeakAgain,
    /// Triage response arrived
    TriageSucceeded { result: TriageResult },
    /// Triage request failed
    TriageFailed { error: String },
    /// User finished the current step
    NextStep,
    /// User pressed "Call emergency services"
    CallDispatch,
    /// User ended the session
    EndSession,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::CaptureSucceeded { .. } => "capture_succeeded",
            SessionEvent::CaptureFailed { .. } => "capture_failed",
            SessionEvent::TextSubmitted { .. } => "text_submitted",
            SessionEvent::PromptCancelled => "prompt_cancelled",
            SessionEvent::SpeakAgain => "speak_again",
            SessionEvent::TriageSucceeded { .. } => "triage_succeeded",
            SessionEvent::TriageFailed { .. } => "triage_failed",
            SessionEvent::NextStep => "next_step",
            SessionEvent::CallDispatch => "call_dispatch",
            SessionEvent::EndSession => "end_session",
        }
    }
}

/// Reason for a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    SessionStarted,
    TranscriptReceived,
    CaptureFailed { message: String },
    TextEntered,
    PromptCancelled,
    RecaptureRequested,
    NeedsClarification,
    DispatchRequired,
    StepsReceived,
    TriageFailed { message: String },
    StepCompleted,
    ManualDispatch,
    UserEnded,
}

/// Work the controller performs after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a speech capture, stopping any previous one first
    StartCapture,
    /// Stop the capture in flight
    CancelCapture,
    /// Ask the user to type instead
    PromptForText { message: String },
    /// Send the text to triage
    RequestTriage { text: String },
    /// Speak, cancelling any utterance in progress
    Announce { text: String },
    /// Cancel any utterance in progress
    StopSpeech,
    /// Dial the dispatch number once `delay` has passed
    Dial { number: String, delay: Duration },
    /// Alert nearby contacts (fire-and-forget)
    SendAlerts { message: String },
    /// Look up the nearest hospital (fire-and-forget)
    LookupHospital,
    /// Append to the incident timeline (fire-and-forget)
    LogEvent {
        description: String,
        metadata: Option<serde_json::Value>,
    },
    /// Replace the timer and metronome for the current step
    PrepareStep { index: usize },
    /// Drop the timer and metronome
    ClearStep,
    /// Blocking error for the user
    ShowError { message: String },
    /// Mark the incident resolved (fire-and-forget)
    ResolveIncident,
    /// Hand over to the summary view
    NavigateToSummary,
}

/// Result of an accepted event
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub reason: TransitionReason,
    pub effects: Vec<Effect>,
}

/// How the critical path places the emergency call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Dialled when the triage result carries no number
    pub default_number: String,
    /// Gap between the announcement and the dial
    pub delay: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            default_number: "911".to_string(),
            delay: Duration::from_millis(2000),
        }
    }
}

/// Session data owned by the state machine
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub transcript: String,
    pub current_triage: Option<TriageResult>,
    pub current_step_index: usize,
    pub alerts_sent: bool,
    pub dispatch_triggered: bool,
    pub hospital_info: Option<HospitalInfo>,
    pub last_error: Option<String>,
}

impl SessionState {
    /// The current step while in GuidedSteps
    pub fn current_step(&self) -> Option<&Step> {
        if self.phase != SessionPhase::GuidedSteps {
            return None;
        }
        self.current_triage
            .as_ref()
            .and_then(|t| t.instruction_steps.get(self.current_step_index))
    }

    pub fn step_count(&self) -> usize {
        self.current_triage
            .as_ref()
            .map_or(0, |t| t.instruction_steps.len())
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step_index + 1 >= self.step_count()
    }

    /// Number to dial: the triage's own, else the configured default
    pub fn dispatch_number<'a>(&'a self, policy: &'a DispatchPolicy) -> &'a str {
        self.current_triage
            .as_ref()
            .and_then(|t| t.dispatch_number.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(policy.default_number.as_str())
    }
}

/// Incident session state machine
///
/// Owns the [`SessionState`]; the controller only reads it and records the
/// outcome of fire-and-forget calls through `record_*`.
pub struct IncidentStateMachine {
    state: SessionState,
    policy: DispatchPolicy,
}

impl IncidentStateMachine {
    /// Creates a new state machine in the Idle phase
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            state: SessionState::default(),
            policy,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Process an event and return the transition if one occurred
    ///
    /// Returns `None` if the event is not valid in the current phase.
    pub fn process_event(&mut self, event: SessionEvent) -> Option<Transition> {
        let from = self.state.phase;
        let transition = match (from, event) {
            // IDLE
            (SessionPhase::Idle, SessionEvent::Start) => {
                Some(Self::begin_capture(from, TransitionReason::SessionStarted))
            }
            (SessionPhase::Idle, SessionEvent::SpeakAgain) => {
                Some(Self::begin_capture(from, TransitionReason::RecaptureRequested))
            }
            (SessionPhase::Idle, SessionEvent::TextSubmitted { text }) => {
                self.begin_triage(from, &text, TransitionReason::TextEntered, Vec::new())
            }
            (SessionPhase::Idle, SessionEvent::PromptCancelled) => Some(Transition {
                from,
                to: SessionPhase::Idle,
                reason: TransitionReason::PromptCancelled,
                effects: Vec::new(),
            }),

            // CAPTURING
            (SessionPhase::Capturing, SessionEvent::CaptureSucceeded { transcript }) => {
                if transcript.trim().is_empty() {
                    Some(self.capture_failed(from, "No speech detected".to_string()))
                } else {
                    self.begin_triage(
                        from,
                        &transcript,
                        TransitionReason::TranscriptReceived,
                        Vec::new(),
                    )
                }
            }
            (SessionPhase::Capturing, SessionEvent::CaptureFailed { error }) => {
                Some(self.capture_failed(from, error))
            }
            (SessionPhase::Capturing, SessionEvent::TextSubmitted { text }) => self.begin_triage(
                from,
                &text,
                TransitionReason::TextEntered,
                vec![Effect::CancelCapture],
            ),

            // TRIAGING
            (SessionPhase::Triaging, SessionEvent::TriageSucceeded { result }) => {
                Some(self.enter_branch(from, result))
            }
            (SessionPhase::Triaging, SessionEvent::TriageFailed { error }) => {
                let back_to = match &self.state.current_triage {
                    Some(previous) if triage::classify(previous) == Branch::Clarifying => {
                        SessionPhase::Clarifying
                    }
                    _ => SessionPhase::Idle,
                };
                Some(Transition {
                    from,
                    to: back_to,
                    reason: TransitionReason::TriageFailed {
                        message: error.clone(),
                    },
                    effects: vec![Effect::ShowError {
                        message: format!("Error processing emergency: {}", error),
                    }],
                })
            }

            // CLARIFYING
            (SessionPhase::Clarifying, SessionEvent::SpeakAgain) => {
                Some(Self::begin_capture(from, TransitionReason::RecaptureRequested))
            }
            (SessionPhase::Clarifying, SessionEvent::TextSubmitted { text }) => {
                self.begin_triage(from, &text, TransitionReason::TextEntered, Vec::new())
            }

            // GUIDED STEPS
            (SessionPhase::GuidedSteps, SessionEvent::NextStep) => self.advance_step(from),

            // Manual call from any live phase
            (phase, SessionEvent::CallDispatch) if !phase.is_terminal() => {
                let number = self.state.dispatch_number(&self.policy).to_string();
                Some(Transition {
                    from,
                    to: phase,
                    reason: TransitionReason::ManualDispatch,
                    effects: vec![Effect::Dial {
                        number,
                        delay: Duration::ZERO,
                    }],
                })
            }

            (phase, SessionEvent::EndSession) if phase.can_end() => Some(Transition {
                from,
                to: SessionPhase::Resolved,
                reason: TransitionReason::UserEnded,
                effects: vec![
                    Effect::ClearStep,
                    Effect::ResolveIncident,
                    Effect::StopSpeech,
                    Effect::NavigateToSummary,
                ],
            }),

            // Invalid transitions
            _ => None,
        };

        if let Some(ref result) = transition {
            self.apply_transition(result);
        }

        transition
    }

    fn begin_capture(from: SessionPhase, reason: TransitionReason) -> Transition {
        Transition {
            from,
            to: SessionPhase::Capturing,
            reason,
            effects: vec![Effect::StartCapture],
        }
    }

    fn capture_failed(&self, from: SessionPhase, error: String) -> Transition {
        let message = if self.state.current_triage.is_some() {
            CLARIFICATION_PROMPT
        } else {
            TEXT_FALLBACK_MESSAGE
        };
        Transition {
            from,
            to: SessionPhase::Idle,
            reason: TransitionReason::CaptureFailed { message: error },
            effects: vec![Effect::PromptForText {
                message: message.to_string(),
            }],
        }
    }

    fn begin_triage(
        &mut self,
        from: SessionPhase,
        text: &str,
        reason: TransitionReason,
        mut effects: Vec<Effect>,
    ) -> Option<Transition> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.state.transcript = text.to_string();
        effects.push(Effect::RequestTriage {
            text: text.to_string(),
        });
        Some(Transition {
            from,
            to: SessionPhase::Triaging,
            reason,
            effects,
        })
    }

    fn enter_branch(&mut self, from: SessionPhase, result: TriageResult) -> Transition {
        let branch = triage::classify(&result);
        let log = Effect::LogEvent {
            description: triage::triage_event(&result),
            metadata: None,
        };
        let alert = Effect::SendAlerts {
            message: triage::alert_message(&result),
        };
        self.state.current_triage = Some(result);
        self.state.current_step_index = 0;

        let (to, reason, effects) = match branch {
            Branch::CriticalPath => {
                let number = self.state.dispatch_number(&self.policy).to_string();
                (
                    SessionPhase::CriticalPath,
                    TransitionReason::DispatchRequired,
                    vec![
                        log,
                        Effect::Announce {
                            text: CRITICAL_ANNOUNCEMENT.to_string(),
                        },
                        Effect::Dial {
                            number,
                            delay: self.policy.delay,
                        },
                        alert,
                        Effect::LookupHospital,
                    ],
                )
            }
            Branch::GuidedSteps => {
                let first = self
                    .state
                    .current_triage
                    .as_ref()
                    .and_then(|t| t.instruction_steps.first())
                    .map(Step::announcement)
                    .unwrap_or_default();
                (
                    SessionPhase::GuidedSteps,
                    TransitionReason::StepsReceived,
                    vec![
                        log,
                        Effect::PrepareStep { index: 0 },
                        Effect::Announce { text: first },
                        alert,
                        Effect::LookupHospital,
                    ],
                )
            }
            Branch::Clarifying => (
                SessionPhase::Clarifying,
                TransitionReason::NeedsClarification,
                vec![log],
            ),
        };

        Transition {
            from,
            to,
            reason,
            effects,
        }
    }

    fn advance_step(&mut self, from: SessionPhase) -> Option<Transition> {
        let triage = self.state.current_triage.as_ref()?;
        let next = self.state.current_step_index + 1;
        let step = triage.instruction_steps.get(next)?;
        let finished = &triage.instruction_steps[self.state.current_step_index];

        let effects = vec![
            Effect::PrepareStep { index: next },
            Effect::Announce {
                text: step.announcement(),
            },
            Effect::LogEvent {
                description: triage::completed_event(finished),
                metadata: Some(serde_json::json!({ "step_index": self.state.current_step_index })),
            },
        ];
        self.state.current_step_index = next;

        Some(Transition {
            from,
            to: SessionPhase::GuidedSteps,
            reason: TransitionReason::StepCompleted,
            effects,
        })
    }

    /// Apply a transition, updating the phase and bookkeeping
    fn apply_transition(&mut self, transition: &Transition) {
        self.state.phase = transition.to;

        for effect in &transition.effects {
            match effect {
                Effect::Dial { .. } => self.state.dispatch_triggered = true,
                Effect::ShowError { message } => self.state.last_error = Some(message.clone()),
                Effect::RequestTriage { .. } => self.state.last_error = None,
                _ => {}
            }
        }

        tracing::info!(
            "Session transition: {:?} -> {:?} (reason: {:?})",
            transition.from,
            transition.to,
            transition.reason
        );
    }

    /// Record the outcome of the contact alert fan-out
    pub fn record_alerts_sent(&mut self, receipt: &AlertReceipt) {
        if self.state.phase.is_terminal() {
            return;
        }
        self.state.alerts_sent = true;
        tracing::info!("Alerts sent to {} contacts", receipt.count);
    }

    /// Record the nearest hospital; the first answer per session is kept
    pub fn record_hospital(&mut self, info: HospitalInfo) {
        if self.state.phase.is_terminal() || self.state.hospital_info.is_some() {
            return;
        }
        tracing::info!(
            "Nearest hospital: {} ({:.1} km, {} min)",
            info.name,
            info.distance_km,
            info.eta_minutes
        );
        self.state.hospital_info = Some(info);
    }
}

impl Default for IncidentStateMachine {
    fn default() -> Self {
        Self::new(DispatchPolicy::default())
    }
}
