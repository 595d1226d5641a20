//! Triage accuracy statistics
//!
//! The service records every triage prediction and the feedback given on it.
//! This is the read-only report it publishes at `/learning/stats`. All
//! accuracy and coverage figures are percentages in 0..=100.

use crate::summary::category_label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Feedback coverage below which more feedback is requested
const LOW_COVERAGE_PCT: f64 = 50.0;

/// Feedback coverage considered excellent
const HIGH_COVERAGE_PCT: f64 = 80.0;

/// Accuracy for one triage category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAccuracy {
    pub correct: u64,
    pub total: u64,
    pub accuracy: f64,
}

/// A category the service predicted where feedback named another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonMistake {
    pub predicted: String,
    pub actual: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }

    /// Advice shown next to the trend
    pub fn advice(&self) -> &'static str {
        match self {
            Trend::Improving => "Keep collecting feedback to accelerate learning.",
            Trend::Stable => "More training data needed to see improvement.",
            Trend::Declining => "Review recent feedback for quality issues.",
        }
    }
}

/// Last seven days against the seven before
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentImprovement {
    pub last_7_days_accuracy: f64,
    pub previous_7_days_accuracy: f64,
    /// Percentage points, negative when accuracy dropped
    pub improvement: f64,
    pub trend: Trend,
}

impl Default for RecentImprovement {
    fn default() -> Self {
        Self {
            last_7_days_accuracy: 0.0,
            previous_7_days_accuracy: 0.0,
            improvement: 0.0,
            trend: Trend::Stable,
        }
    }
}

/// `/learning/stats` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    #[serde(default)]
    pub success: bool,
    pub overall_accuracy: f64,
    pub total_predictions: u64,
    pub predictions_with_feedback: u64,
    pub correct_predictions: u64,
    #[serde(default)]
    pub accuracy_by_type: BTreeMap<String, TypeAccuracy>,
    #[serde(default)]
    pub common_mistakes: Vec<CommonMistake>,
    #[serde(default)]
    pub recent_improvement: RecentImprovement,
    #[serde(default)]
    pub feedback_coverage: f64,
    #[serde(default)]
    pub summary: String,
}

/// Percentage with one decimal and an explicit sign
fn signed_percent(value: f64) -> String {
    if value >= 0.0 {
        format!("+{:.1}%", value)
    } else {
        format!("{:.1}%", value)
    }
}

impl LearningStats {
    /// Hint matching the share of predictions that received feedback
    pub fn coverage_hint(&self) -> &'static str {
        if self.feedback_coverage < LOW_COVERAGE_PCT {
            "Collect more feedback to accelerate learning!"
        } else if self.feedback_coverage < HIGH_COVERAGE_PCT {
            "Good feedback coverage. Keep it up!"
        } else {
            "Excellent feedback coverage!"
        }
    }

    /// Plain-text report for the terminal
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(50);
        let thin = "-".repeat(50);
        let mut out = String::new();

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "TRIAGE LEARNING STATS");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Overall accuracy: {:.1}%", self.overall_accuracy);
        let _ = writeln!(
            out,
            "Predictions: {} ({} with feedback, {} correct)",
            self.total_predictions, self.predictions_with_feedback, self.correct_predictions
        );
        let _ = writeln!(
            out,
            "Feedback coverage: {:.1}%. {}",
            self.feedback_coverage,
            self.coverage_hint()
        );

        if self.total_predictions > 0 {
            let recent = &self.recent_improvement;
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Last 7 days: {:.1}% (previous 7 days: {:.1}%)",
                recent.last_7_days_accuracy, recent.previous_7_days_accuracy
            );
            let _ = writeln!(
                out,
                "Improvement: {} ({}). {}",
                signed_percent(recent.improvement),
                recent.trend.as_str(),
                recent.trend.advice()
            );
        }

        if !self.accuracy_by_type.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "ACCURACY BY TYPE:");
            let _ = writeln!(out, "{}", thin);
            for (category, accuracy) in &self.accuracy_by_type {
                let _ = writeln!(
                    out,
                    "  {}: {}/{} ({:.1}%)",
                    category_label(category),
                    accuracy.correct,
                    accuracy.total,
                    accuracy.accuracy
                );
            }
        }

        if !self.common_mistakes.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "COMMON MISTAKES:");
            let _ = writeln!(out, "{}", thin);
            for mistake in &self.common_mistakes {
                let _ = writeln!(
                    out,
                    "  {} -> {} ({} time{})",
                    category_label(&mistake.predicted),
                    category_label(&mistake.actual),
                    mistake.count,
                    if mistake.count == 1 { "" } else { "s" }
                );
            }
        }

        let _ = writeln!(out, "{}", thin);
        if self.summary.is_empty() {
            let _ = writeln!(
                out,
                "{:.1}% accurate across {} predictions",
                self.overall_accuracy, self.total_predictions
            );
        } else {
            let _ = writeln!(out, "{}", self.summary);
        }
        if self.total_predictions == 0 {
            let _ = writeln!(out, "No predictions yet. Run an incident to get started.");
        }
        out
    }
}
