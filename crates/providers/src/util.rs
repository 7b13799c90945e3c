//! Shared utility functions for provider adapters.

use hb_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read an API key from the named environment variable.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::Auth(format!(
            "environment variable '{env_var}' not set or empty"
        ))),
    }
}

/// Map an upstream error `type` string to the HTTP status the same
/// condition would have produced before streaming began.
pub(crate) fn status_for_error_type(kind: &str) -> Option<u16> {
    match kind {
        "overloaded_error" => Some(529),
        "rate_limit_error" => Some(429),
        "invalid_request_error" => Some(400),
        "authentication_error" => Some(401),
        "permission_error" => Some(403),
        "not_found_error" => Some(404),
        "request_too_large" => Some(413),
        "api_error" => Some(500),
        _ => None,
    }
}
