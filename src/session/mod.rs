//! Incident session
//!
//! Coordinates one emergency-guidance session from the first utterance to
//! resolution: voice capture, triage, the branch-specific flow, alerts,
//! hospital lookup and the final resolve.
//!
//! ## Phases
//!
//! 1. **IDLE** - Nothing captured yet, or a capture failed
//! 2. **CAPTURING** - Listening for one utterance
//! 3. **TRIAGING** - Waiting for the triage response
//! 4. **CLARIFYING** - The service asked for more information
//! 5. **CRITICAL_PATH** - Dispatch required: call, alert, hospital status
//! 6. **GUIDED_STEPS** - One instruction step at a time
//! 7. **RESOLVED** - Ended by the user
//!
//! ## Transitions
//!
//! ```text
//!            start / speak again                 transcript
//! ┌──────┐ ─────────────────────► ┌───────────┐ ─────────────► ┌──────────┐
//! │ IDLE │                        │ CAPTURING │                │ TRIAGING │
//! └──────┘ ◄───────────────────── └───────────┘                └──────────┘
//!    │  ▲      capture failed          ▲                        │  │  │
//!    │  │      (text prompt)           │ speak again            │  │  │
//!    │  │                         ┌────────────┐  clarification │  │  │
//!    │  │  triage failed          │ CLARIFYING │ ◄──────────────┘  │  │
//!    │  └──────────────────────── └────────────┘                   │  │
//!    │                                 │ typed text                │  │
//!    │ typed text                      └──────────► TRIAGING       │  │
//!    └──────────────────────────────────────────► TRIAGING        │  │
//!                                                                  │  │
//!              ┌───────────────┐           dispatch required       │  │
//!              │ CRITICAL_PATH │ ◄─────────────────────────────────┘  │
//!              └───────────────┘                                      │
//!                      │            ┌──────────────┐   steps          │
//!                      │            │ GUIDED_STEPS │ ◄────────────────┘
//!                      │            └──────────────┘ ──┐ next step
//!                      │  end session      │   ▲ ──────┘
//!                      ▼                   ▼
//!                    ┌──────────────────────┐
//!                    │       RESOLVED       │
//!                    └──────────────────────┘
//! ```
//!
//! Entering CRITICAL_PATH announces the emergency, dials the dispatch number
//! after a short delay, alerts contacts and looks up the nearest hospital.
//! Entering GUIDED_STEPS announces the first step, alerts contacts and looks
//! up the hospital. Those side calls run as independent tasks; their failures
//! are logged and never change the phase. A failed triage request is the only
//! error shown to the user.

pub mod controller;
pub mod state;
pub mod triage;

pub use controller::{
    IncidentSession, MetronomeView, SessionDeps, SessionHandle, SessionOutcome, SessionSettings,
    SessionSnapshot, TimerView,
};
pub use state::{
    DispatchPolicy, Effect, IncidentStateMachine, SessionEvent, SessionPhase, SessionState,
    Transition, TransitionReason, CLARIFICATION_PROMPT, CRITICAL_ANNOUNCEMENT,
    TEXT_FALLBACK_MESSAGE,
};
pub use triage::{alert_message, classify, infer_age_group, Branch};
