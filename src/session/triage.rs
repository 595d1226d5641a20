//! Triage helpers
//!
//! Pure functions the session uses around a triage call: guessing the
//! patient's age bracket from the transcript, choosing the session branch for
//! a result, and building the alert message and timeline descriptions.

use crate::api::{AgeGroup, Step, TriageResult};
use regex::Regex;
use std::sync::LazyLock;

/// Categories the service returns when it needs more information
pub const CLARIFICATION_CATEGORIES: [&str; 2] = ["needs_clarification", "needs_age_clarification"];

static ELDERLY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(elderly|grandpa|grandma|grandfather|grandmother|senior|old (man|woman|lady)|aged|father|mother|dad|mom|mum)\b|\b(6[5-9]|[7-9]\d|1[01]\d)\s*(-\s*)?years?[\s-]*old\b",
    )
    .unwrap()
});

static CHILD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(child|children|kid|kids|baby|infant|toddler|boy|girl|son|daughter|minor)\b|\b(1[0-7]|\d)\s*(-\s*)?years?[\s-]*old\b|\b\d{1,2}\s*(-\s*)?(months?|weeks?)[\s-]*old\b",
    )
    .unwrap()
});

/// Guess the patient's age bracket from what was said
///
/// Elderly cues win over child cues. Returns `None` when nothing matches so
/// the service can ask for the age itself.
pub fn infer_age_group(text: &str) -> Option<AgeGroup> {
    if ELDERLY_PATTERN.is_match(text) {
        Some(AgeGroup::Elderly)
    } else if CHILD_PATTERN.is_match(text) {
        Some(AgeGroup::Child)
    } else {
        None
    }
}

/// Session branch a triage result leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    CriticalPath,
    Clarifying,
    GuidedSteps,
}

pub fn is_clarification(result: &TriageResult) -> bool {
    CLARIFICATION_CATEGORIES.contains(&result.category.as_str())
}

/// Pick the branch for a triage result
///
/// Dispatch takes precedence over everything else, so a critical result that
/// also lists steps or carries a clarification category still goes to the
/// critical path. A result with neither dispatch nor steps asks for more input.
pub fn classify(result: &TriageResult) -> Branch {
    if result.requires_immediate_dispatch {
        Branch::CriticalPath
    } else if is_clarification(result) {
        Branch::Clarifying
    } else if !result.instruction_steps.is_empty() {
        Branch::GuidedSteps
    } else {
        Branch::Clarifying
    }
}

/// Message sent to nearby contacts
pub fn alert_message(result: &TriageResult) -> String {
    format!(
        "Emergency: {}. {}.",
        result.category_label(),
        result.supplies_needed.join(", ")
    )
}

/// Timeline entry written for every triage result
pub fn triage_event(result: &TriageResult) -> String {
    format!("Triage: {} ({})", result.category, result.severity_level)
}

/// Timeline entry written when the user moves past a step
pub fn completed_event(step: &Step) -> String {
    format!("Completed: {}", step.title)
}
