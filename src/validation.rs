//! Input validation for the API boundary.

use crate::error::{GateError, Result};

/// Maximum length for site keys.
const MAX_SITE_KEY_LENGTH: usize = 128;

/// Maximum length for checkout session ids.
const MAX_SESSION_ID_LENGTH: usize = 256;

/// Validate a site key.
///
/// Site keys must be non-empty, at most 128 characters, and contain only
/// alphanumeric characters, underscores, and hyphens.
///
/// # Errors
///
/// Returns `InvalidRequest` if validation fails.
pub fn validate_site_key(site_key: &str) -> Result<()> {
    if site_key.is_empty() {
        return Err(GateError::invalid_request("siteKey cannot be empty"));
    }

    if site_key.len() > MAX_SITE_KEY_LENGTH {
        return Err(GateError::invalid_request(format!(
            "siteKey exceeds maximum length of {MAX_SITE_KEY_LENGTH}"
        )));
    }

    if !site_key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GateError::invalid_request(
            "siteKey contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
        ));
    }

    Ok(())
}

/// Validate a checkout-redirect session id.
///
/// Session ids are provider-issued opaque tokens; we only bound their length
/// and character set before passing them upstream.
///
/// # Errors
///
/// Returns `InvalidRequest` if validation fails.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(GateError::invalid_request("session_id cannot be empty"));
    }

    if session_id.len() > MAX_SESSION_ID_LENGTH {
        return Err(GateError::invalid_request(format!(
            "session_id exceeds maximum length of {MAX_SESSION_ID_LENGTH}"
        )));
    }

    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GateError::invalid_request(
            "session_id contains invalid characters",
        ));
    }

    Ok(())
}
