//! HTTP client for the emergency service

use super::types::{
    Ack, AlertReceipt, AlertRequest, CreateIncidentRequest, CreatedIncident, EventRequest,
    HospitalInfo, IncidentId, LatLng, TriageRequest, TriageResult,
};
use super::{EmergencyApi, TokenStore};
use crate::config::ApiConfig;
use crate::contacts::{Contact, NewContact};
use crate::learning::LearningStats;
use crate::permissions::Coordinates;
use crate::summary::{SummaryDocument, SummaryFormat};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Error types for service calls
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    /// No token, or the service rejected it (HTTP 401)
    #[error("Not signed in or session expired: {0}")]
    Unauthorized(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Emergency service HTTP client
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    tokens: TokenStore,
}

impl ApiClient {
    /// Create a client from the `api` config section
    pub fn from_config(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        Self::with_config(
            &config.base_url,
            config.timeout_secs.map(Duration::from_secs),
            tokens,
        )
    }

    /// Create a client with an explicit base URL and optional timeout
    pub fn with_config(
        base_url: &str,
        timeout: Option<Duration>,
        tokens: TokenStore,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and decode the JSON response
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        tracing::debug!("{} {}", status.as_u16(), response.url().path());

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::ParseError(e.to_string()))
    }
}

/// Error for a non-success HTTP status
fn status_error(status: u16, message: String) -> ApiError {
    match status {
        401 => ApiError::Unauthorized(message),
        _ => ApiError::ServerError { status, message },
    }
}

#[async_trait]
impl EmergencyApi for ApiClient {
    async fn triage(&self, request: &TriageRequest) -> Result<TriageResult, ApiError> {
        tracing::debug!(
            "Requesting triage ({} characters, age_group: {:?})",
            request.text.len(),
            request.age_group
        );
        self.send(self.client.post(self.endpoint("/triage")).json(request))
            .await
    }

    async fn create_incident(&self, at: Coordinates) -> Result<IncidentId, ApiError> {
        let body = CreateIncidentRequest {
            lat: at.latitude,
            lng: at.longitude,
        };
        let created: CreatedIncident = self
            .send(self.client.post(self.endpoint("/incidents/create")).json(&body))
            .await?;
        tracing::info!("Created incident {}", created.id);
        Ok(created.id)
    }

    async fn log_event(
        &self,
        incident: IncidentId,
        step_description: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        let body = EventRequest {
            step: step_description,
            metadata,
        };
        let _: Ack = self
            .send(
                self.client
                    .post(self.endpoint(&format!("/incidents/{}/event", incident)))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn send_alerts(&self, request: &AlertRequest) -> Result<AlertReceipt, ApiError> {
        self.send(self.client.post(self.endpoint("/alerts")).json(request))
            .await
    }

    async fn nearest_hospital(&self, at: Coordinates) -> Result<HospitalInfo, ApiError> {
        let body = LatLng {
            lat: at.latitude,
            lng: at.longitude,
        };
        self.send(self.client.post(self.endpoint("/route")).json(&body))
            .await
    }

    async fn resolve_incident(&self, incident: IncidentId) -> Result<(), ApiError> {
        let _: Ack = self
            .send(
                self.client
                    .post(self.endpoint(&format!("/incidents/{}/resolve", incident))),
            )
            .await?;
        Ok(())
    }

    async fn incident_summary(
        &self,
        incident: IncidentId,
        format: SummaryFormat,
    ) -> Result<SummaryDocument, ApiError> {
        self.send(
            self.client
                .get(self.endpoint(&format!("/incidents/{}/summary", incident)))
                .query(&[("format", format.as_str())]),
        )
        .await
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        self.send(self.client.get(self.endpoint("/contacts/"))).await
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, ApiError> {
        self.send(self.client.post(self.endpoint("/contacts/")).json(contact))
            .await
    }

    async fn delete_contact(&self, contact_id: i64) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(
                self.client
                    .delete(self.endpoint(&format!("/contacts/{}", contact_id))),
            )
            .await?;
        Ok(())
    }

    async fn learning_stats(&self) -> Result<LearningStats, ApiError> {
        self.send(self.client.get(self.endpoint("/learning/stats")))
            .await
    }
}
