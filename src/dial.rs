//! Telephone dial-out through the `tel:` URI scheme

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialError {
    #[error("Invalid phone number: {0:?}")]
    InvalidNumber(String),

    #[error("Dial-out failed: {0}")]
    Failed(String),
}

/// Hands a `tel:` URI to the host telephony handler
pub trait Dialer: Send + Sync {
    fn dial(&self, uri: &Url) -> Result<(), DialError>;
}

/// Build a `tel:` URI, dropping visual separators
pub fn tel_uri(number: &str) -> Result<Url, DialError> {
    let cleaned: String = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let valid = !cleaned.is_empty()
        && cleaned
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || c == '*' || c == '#' || (c == '+' && i == 0));

    if !valid || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(DialError::InvalidNumber(number.to_string()));
    }

    Url::parse(&format!("tel:{}", cleaned)).map_err(|_| DialError::InvalidNumber(number.to_string()))
}

/// Dial `number`, logging rather than propagating failures
pub fn dial_number(dialer: &dyn Dialer, number: &str) -> bool {
    let result = tel_uri(number).and_then(|uri| {
        tracing::info!("Dialing {}", uri);
        dialer.dial(&uri)
    });

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to dial {}: {}", number, e);
            false
        }
    }
}
