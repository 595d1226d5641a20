//! Trusted contacts alerted during an incident

use crate::api::{ApiError, EmergencyApi};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default alert radius for a new contact in metres
pub const DEFAULT_RADIUS_M: u32 = 500;

/// A stored contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "radius_m")]
    pub radius_meters: u32,
}

/// Contact creation request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "radius_m")]
    pub radius_meters: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Contact name cannot be empty")]
    EmptyName,

    #[error("Invalid phone number: {0:?}")]
    InvalidPhone(String),

    #[error("Alert radius must be positive")]
    InvalidRadius,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl NewContact {
    /// Build a validated contact with trimmed fields
    pub fn new(
        name: &str,
        phone: &str,
        latitude: f64,
        longitude: f64,
        radius_meters: u32,
    ) -> Result<Self, ContactError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContactError::EmptyName);
        }

        let phone = phone.trim();
        if !is_valid_phone(phone) {
            return Err(ContactError::InvalidPhone(phone.to_string()));
        }

        if radius_meters == 0 {
            return Err(ContactError::InvalidRadius);
        }

        Ok(Self {
            name: name.to_string(),
            phone: phone.to_string(),
            latitude,
            longitude,
            radius_meters,
        })
    }
}

/// Digits with an optional leading `+` and the usual separators
fn is_valid_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 3
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'))
}

/// Contact management over the service API
pub struct ContactBook {
    api: Arc<dyn EmergencyApi>,
}

impl ContactBook {
    pub fn new(api: Arc<dyn EmergencyApi>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Contact>, ContactError> {
        let contacts = self.api.list_contacts().await?;
        tracing::debug!("Loaded {} contacts", contacts.len());
        Ok(contacts)
    }

    pub async fn add(&self, contact: NewContact) -> Result<Contact, ContactError> {
        let created = self.api.create_contact(&contact).await?;
        tracing::info!("Added contact {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn remove(&self, contact_id: i64) -> Result<(), ContactError> {
        self.api.delete_contact(contact_id).await?;
        tracing::info!("Removed contact {}", contact_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_contact_trims_fields() {
        let contact = NewContact::new("  Ada  ", " +1 716-555-0100 ", 1.0, 2.0, 500).unwrap();
        assert_eq!(contact.name, "Ada");
        assert_eq!(contact.phone, "+1 716-555-0100");
    }

    #[test]
    fn test_new_contact_validation() {
        assert!(matches!(
            NewContact::new(" ", "911", 0.0, 0.0, 500),
            Err(ContactError::EmptyName)
        ));
        assert!(matches!(
            NewContact::new("Ada", "phone", 0.0, 0.0, 500),
            Err(ContactError::InvalidPhone(_))
        ));
        assert!(matches!(
            NewContact::new("Ada", "12", 0.0, 0.0, 500),
            Err(ContactError::InvalidPhone(_))
        ));
        assert!(matches!(
            NewContact::new("Ada", "7165550100", 0.0, 0.0, 0),
            Err(ContactError::InvalidRadius)
        ));
    }

    #[test]
    fn test_contact_wire_names() {
        let json = r#"{"id": 3, "name": "Ada", "phone": "911", "lat": 1.5, "lng": 2.5, "radius_m": 250}"#;
        let contact: Contact = serde_json::from_str(json).unwrap();
        assert_eq!(contact.latitude, 1.5);
        assert_eq!(contact.radius_meters, 250);

        let new = NewContact::new("Ada", "911", 1.5, 2.5, DEFAULT_RADIUS_M).unwrap();
        let value = serde_json::to_value(&new).unwrap();
        assert_eq!(value["radius_m"], 500);
        assert_eq!(value["lng"], 2.5);
    }
}
