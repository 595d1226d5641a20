//! Incident summary for EMS and family
//!
//! Read-only view of a resolved incident: overview fields plus a timeline of
//! logged events with their offsets from the start of the incident.

use crate::api::IncidentId;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Summary representation requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    Json,
    Text,
}

impl SummaryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryFormat::Json => "json",
            SummaryFormat::Text => "text",
        }
    }
}

/// Position recorded with the incident
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryLocation {
    pub lat: f64,
    pub lng: f64,
}

/// One logged event on the incident timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// ISO-8601 timestamp
    pub time: String,
    pub elapsed_seconds: u64,
    pub step: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Structured incident summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub incident_id: IncidentId,
    #[serde(rename = "type", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    pub status: String,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    pub location: SummaryLocation,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub total_steps: usize,
}

/// Summary as returned for either format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryDocument {
    Text { summary: String },
    Structured(Box<IncidentSummary>),
}

/// Offset from incident start as `+MM:SS`
pub fn format_elapsed(elapsed_seconds: u64) -> String {
    format!("+{:02}:{:02}", elapsed_seconds / 60, elapsed_seconds % 60)
}

/// Duration as `Xm Ys`
pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Triage category for display: `minor_cut` becomes `MINOR CUT`
pub fn category_label(category: &str) -> String {
    category.replace('_', " ").to_uppercase()
}

impl IncidentSummary {
    pub fn category_label(&self) -> String {
        category_label(self.category.as_deref().unwrap_or("unknown"))
    }

    /// Plain-text report for sharing
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(50);
        let thin = "-".repeat(50);
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "EMERGENCY INCIDENT SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Incident ID: {}", self.incident_id);
        let _ = writeln!(out, "Type: {}", self.category_label());
        let _ = writeln!(
            out,
            "Severity: {}",
            self.severity.as_deref().unwrap_or("unknown").to_uppercase()
        );
        let _ = writeln!(out, "Status: {}", self.status);
        let _ = writeln!(out);
        let _ = writeln!(out, "Started: {}", self.started_at);
        let _ = writeln!(
            out,
            "Ended: {}",
            self.ended_at.as_deref().unwrap_or("In progress")
        );
        match self.duration_seconds {
            Some(seconds) => {
                let _ = writeln!(out, "Duration: {}", format_duration(seconds));
            }
            None => {
                let _ = writeln!(out, "Duration: Ongoing");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Location: {}, {}",
            self.location.lat, self.location.lng
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "TIMELINE:");
        let _ = writeln!(out, "{}", thin);

        for entry in &self.timeline {
            let _ = writeln!(out, "[{}] {}", format_elapsed(entry.elapsed_seconds), entry.step);
            if let Some(metadata) = entry.metadata.as_ref().filter(|m| !m.is_null()) {
                let _ = writeln!(out, "         Details: {}", metadata);
            }
        }

        let _ = writeln!(out, "{}", thin);
        let _ = writeln!(out, "Total events: {}", self.timeline.len());
        out
    }
}

impl SummaryDocument {
    /// Text suitable for display regardless of the format fetched
    pub fn to_display_text(&self) -> String {
        match self {
            SummaryDocument::Text { summary } => summary.clone(),
            SummaryDocument::Structured(summary) => summary.render_text(),
        }
    }
}
