//! Shared HTTP helpers: client construction, auth and CSRF headers.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::error::RealtimeError;

/// Header carrying the Django CSRF token.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Cookie the backend stores the CSRF token under.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Build a reqwest client with a request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, RealtimeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RealtimeError::from)
}

/// `Authorization: Bearer <token>`.
pub fn bearer_header(token: &str) -> Result<HeaderValue, RealtimeError> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|error| RealtimeError::Configuration(format!("Invalid bearer token: {error}")))
}

/// Headers the backend expects on same-origin XHR calls.
pub fn backend_headers(csrf_token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
    if let Some(token) = csrf_token {
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert(CSRF_HEADER, value);
        }
    }
    headers
}

/// Add an `Authorization` header to `headers`.
pub fn with_bearer(mut headers: HeaderMap, token: &str) -> Result<HeaderMap, RealtimeError> {
    headers.insert(AUTHORIZATION, bearer_header(token)?);
    Ok(headers)
}

/// Extract the CSRF token from a `Cookie` header value.
pub fn csrf_from_cookie(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(CSRF_COOKIE)?.strip_prefix('='))
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// The backend's `error` field, or `status N` when the body has none.
pub fn backend_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(String::from))
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("status {status}"))
}

pub fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}
