use axum::http::HeaderMap;

use crate::services::api::ApiError;
use crate::settings::Settings;

/// Gate shared by every route except the health probe. Accepts the secret
/// from either `X-Api-Key` or `Authorization: Bearer <secret>`; when both
/// are absent the candidate is empty and the comparison fails.
pub fn require_api_key(settings: &Settings, headers: &HeaderMap) -> Result<(), ApiError> {
    let candidate = header_str(headers, "x-api-key")
        .or_else(|| bearer_token(headers))
        .unwrap_or_default();

    if candidate.is_empty() || candidate != settings.api_key {
        return Err(ApiError::Auth);
    }

    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_token<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    header_str(headers, "authorization").map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
}
