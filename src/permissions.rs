//! Permission gateway
//!
//! Wraps the location, microphone and notification capabilities of the host.
//! Every query answers with a [`Capability`] so callers handle the unsupported
//! and denied cases explicitly instead of probing optional values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of probing a host capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Capability<T> {
    /// The capability exists and produced a value
    Supported(T),
    /// The host does not offer this capability at all
    Unsupported,
    /// The user or platform refused access
    Denied,
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    /// Returns the supported value, if any
    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(value) => Some(value),
            _ => None,
        }
    }
}

/// Host permission state for a capability that can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    /// Not decided yet; asking will show the host prompt
    Prompt,
    Denied,
}

/// Geographic position, captured once per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One-shot positioning options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    /// How long to wait for a fix
    pub timeout: Duration,
    /// Oldest cached position that may be returned
    pub maximum_age: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

/// Failure to obtain a position
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Geolocation not supported")]
    Unsupported,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),
}

/// Host capabilities the gateway queries
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Query the location permission without prompting
    async fn query_location(&self) -> Capability<PermissionState>;

    /// Acquire and immediately release a microphone stream
    async fn request_microphone(&self) -> Capability<()>;

    async fn request_notifications(&self) -> Capability<PermissionState>;

    /// Single position fix, no tracking
    async fn current_position(
        &self,
        options: &GeolocationOptions,
    ) -> Result<Capability<Coordinates>, LocationError>;
}

/// Result of a permission check, as shown on the home screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionReport {
    pub location: Capability<PermissionState>,
    pub microphone: Capability<()>,
    pub notifications: Capability<PermissionState>,
}

impl PermissionReport {
    /// Location can be used when granted or still requestable.
    ///
    /// A host that cannot answer the query is treated as requestable; the
    /// position request itself will surface a real refusal.
    pub fn location_usable(&self) -> bool {
        match &self.location {
            Capability::Supported(state) => *state != PermissionState::Denied,
            Capability::Unsupported => true,
            Capability::Denied => false,
        }
    }

    pub fn microphone_usable(&self) -> bool {
        self.microphone.is_supported()
    }

    /// Whether the emergency trigger may be pressed
    pub fn emergency_enabled(&self) -> bool {
        self.location_usable() && self.microphone_usable()
    }

    /// Names of the missing required permissions
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.location_usable() {
            missing.push("location");
        }
        if !self.microphone_usable() {
            missing.push("microphone");
        }
        missing
    }

    /// Persistent banner text while required permissions are missing
    pub fn banner(&self) -> Option<PermissionBanner> {
        let missing = self.missing();
        if missing.is_empty() {
            return None;
        }

        Some(PermissionBanner {
            message: format!(
                "Permissions required: this app needs access to your {} to provide emergency assistance.",
                missing.join(" and ")
            ),
            retry_label: "Grant Permissions".to_string(),
        })
    }
}

/// Non-blocking banner with a retry action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionBanner {
    pub message: String,
    pub retry_label: String,
}

/// Permission checks and one-shot positioning
pub struct PermissionGateway<P: PermissionProvider> {
    provider: P,
    options: GeolocationOptions,
}

impl<P: PermissionProvider> PermissionGateway<P> {
    pub fn new(provider: P, options: GeolocationOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &GeolocationOptions {
        &self.options
    }

    /// Query every permission; safe to call again as the banner's retry action
    pub async fn check(&self) -> PermissionReport {
        let location = self.provider.query_location().await;
        let microphone = self.provider.request_microphone().await;
        let notifications = self.provider.request_notifications().await;

        let report = PermissionReport {
            location,
            microphone,
            notifications,
        };

        if report.emergency_enabled() {
            tracing::info!("Required permissions available");
        } else {
            tracing::warn!("Missing permissions: {:?}", report.missing());
        }

        report
    }

    /// Capture the current position once
    pub async fn locate(&self) -> Result<Coordinates, LocationError> {
        match self.provider.current_position(&self.options).await? {
            Capability::Supported(coordinates) => {
                tracing::debug!(
                    "Position fix: {:.5}, {:.5}",
                    coordinates.latitude,
                    coordinates.longitude
                );
                Ok(coordinates)
            }
            Capability::Unsupported => Err(LocationError::Unsupported),
            Capability::Denied => Err(LocationError::PermissionDenied),
        }
    }
}
