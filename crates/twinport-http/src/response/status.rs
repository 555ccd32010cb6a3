//! HTTP status code utilities

use http::StatusCode;

/// Canonical reason phrase for a status code, `"Unknown"` when there is none
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}
