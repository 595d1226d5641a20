//! Request and response bodies of the emergency service
//!
//! Field names on the wire follow the service (`type`, `requires_sos`,
//! `timer_s`, `lat`/`lng`, ...); the Rust names describe what they mean.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned incident identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub i64);

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patient age bracket sent with triage requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Adult,
    Child,
    Elderly,
}

/// Triage request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageRequest {
    pub text: String,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_group: Option<AgeGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// One instruction in a first-aid sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    pub detail: String,
    /// Countdown for this step in whole seconds
    #[serde(rename = "timer_s", default, skip_serializing_if = "Option::is_none")]
    pub timer_seconds: Option<u32>,
    /// Target repetition rate for the action, e.g. chest compressions
    #[serde(rename = "cadence_bpm", default, skip_serializing_if = "Option::is_none")]
    pub cadence_bpm: Option<u32>,
}

impl Step {
    /// Countdown duration; a zero timer counts as none
    pub fn timer(&self) -> Option<u32> {
        self.timer_seconds.filter(|s| *s > 0)
    }

    /// Metronome cadence; a zero cadence counts as none
    pub fn cadence(&self) -> Option<u32> {
        self.cadence_bpm.filter(|b| *b > 0)
    }

    /// Text read aloud when the step becomes current
    pub fn announcement(&self) -> String {
        format!("{}. {}", self.title, self.detail)
    }
}

/// A category the service considered, with its confidence in 0..=1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCategory {
    #[serde(rename = "type")]
    pub category: String,
    pub confidence: f32,
}

/// Triage classification of one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    #[serde(rename = "type")]
    pub category: String,
    #[serde(rename = "severity")]
    pub severity_level: String,
    #[serde(rename = "requires_sos", default, deserialize_with = "null_as_false")]
    pub requires_immediate_dispatch: bool,
    #[serde(rename = "sos_number", default, skip_serializing_if = "Option::is_none")]
    pub dispatch_number: Option<String>,
    #[serde(rename = "bring", default)]
    pub supplies_needed: Vec<String>,
    #[serde(rename = "steps", default)]
    pub instruction_steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifying_questions: Option<Vec<String>>,
    #[serde(
        rename = "possible_emergencies",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub candidate_categories: Option<Vec<CandidateCategory>>,
    /// Free-text explanation, mostly present on clarification results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl TriageResult {
    /// Category with underscores shown as spaces
    pub fn category_label(&self) -> String {
        self.category.replace('_', " ")
    }
}

/// Nearest hospital with travel estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalInfo {
    #[serde(rename = "hospital_name")]
    pub name: String,
    #[serde(rename = "hospital_address")]
    pub address: String,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub directions_url: String,
}

/// Contact alert request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRequest {
    pub incident_id: IncidentId,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    pub message: String,
    #[serde(rename = "radius_m")]
    pub radius_meters: u32,
}

/// Outcome of a contact alert fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReceipt {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub contacts_notified: Vec<String>,
}

/// Plain acknowledgement returned by write endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIncidentRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedIncident {
    pub id: IncidentId,
}

#[derive(Debug, Serialize)]
pub(crate) struct EventRequest<'a> {
    pub step: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a serde_json::Value>,
}
