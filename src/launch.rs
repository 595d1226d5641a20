//! SOS trigger
//!
//! Checks permissions for the home screen and, when the user triggers an
//! emergency, captures the location once and creates the incident that the
//! session will run against.

use crate::api::{ApiError, EmergencyApi, IncidentId};
use crate::permissions::{
    Coordinates, LocationError, PermissionGateway, PermissionProvider, PermissionReport,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Missing permissions: {}", .0.join(", "))]
    PermissionsMissing(Vec<&'static str>),

    #[error("Could not determine location: {0}")]
    Location(#[from] LocationError),

    #[error("Failed to create incident: {0}")]
    Api(#[from] ApiError),
}

/// Location context handed to a new session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncidentLaunch {
    pub incident_id: IncidentId,
    pub coordinates: Coordinates,
}

pub struct EmergencyLauncher<P: PermissionProvider> {
    gateway: PermissionGateway<P>,
    api: Arc<dyn EmergencyApi>,
}

impl<P: PermissionProvider> EmergencyLauncher<P> {
    pub fn new(gateway: PermissionGateway<P>, api: Arc<dyn EmergencyApi>) -> Self {
        Self { gateway, api }
    }

    /// Current permission state for the home screen banner
    pub async fn check_permissions(&self) -> PermissionReport {
        let report = self.gateway.check().await;
        if let Some(banner) = report.banner() {
            tracing::warn!("{}", banner.message);
        }
        report
    }

    /// Start an emergency: locate once, then create the incident
    pub async fn trigger(&self) -> Result<IncidentLaunch, LaunchError> {
        let report = self.gateway.check().await;
        if !report.emergency_enabled() {
            let missing = report.missing();
            tracing::warn!("SOS refused, missing permissions: {:?}", missing);
            return Err(LaunchError::PermissionsMissing(missing));
        }

        let coordinates = self.gateway.locate().await?;
        let incident_id = self.api.create_incident(coordinates).await?;
        tracing::info!(
            "Emergency triggered: incident {} at ({:.5}, {:.5})",
            incident_id,
            coordinates.latitude,
            coordinates.longitude
        );

        Ok(IncidentLaunch {
            incident_id,
            coordinates,
        })
    }
}
