//! Emergency service API
//!
//! Typed wrapper around the remote service that owns triage, contact alerting,
//! hospital lookup, incident persistence and triage accuracy statistics.
//! Requests carry the bearer token held in the shared [`TokenStore`]; there is
//! no retry or backoff.

pub mod client;
pub mod types;

pub use client::{ApiClient, ApiError};
pub use types::{
    AgeGroup, AlertReceipt, AlertRequest, CandidateCategory, HospitalInfo, IncidentId, Step,
    TriageRequest, TriageResult,
};

use crate::contacts::{Contact, NewContact};
use crate::learning::LearningStats;
use crate::permissions::Coordinates;
use crate::summary::{SummaryDocument, SummaryFormat};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Bearer token slot shared with the identity collaborator
///
/// The collaborator refreshes the token; requests only read it.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        let signed_in = token.is_some();
        *self.token.write() = token;
        tracing::debug!("Auth token updated (signed_in: {})", signed_in);
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}

/// Operations of the emergency service
#[async_trait]
pub trait EmergencyApi: Send + Sync {
    async fn triage(&self, request: &TriageRequest) -> Result<TriageResult, ApiError>;

    async fn create_incident(&self, at: Coordinates) -> Result<IncidentId, ApiError>;

    /// Append a step description to the incident timeline
    async fn log_event(
        &self,
        incident: IncidentId,
        step_description: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ApiError>;

    async fn send_alerts(&self, request: &AlertRequest) -> Result<AlertReceipt, ApiError>;

    async fn nearest_hospital(&self, at: Coordinates) -> Result<HospitalInfo, ApiError>;

    async fn resolve_incident(&self, incident: IncidentId) -> Result<(), ApiError>;

    async fn incident_summary(
        &self,
        incident: IncidentId,
        format: SummaryFormat,
    ) -> Result<SummaryDocument, ApiError>;

    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError>;

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, ApiError>;

    async fn delete_contact(&self, contact_id: i64) -> Result<(), ApiError>;

    /// Triage accuracy report built from prediction feedback
    async fn learning_stats(&self) -> Result<LearningStats, ApiError>;
}
