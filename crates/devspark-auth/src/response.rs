//! Helpers for turning non-success HTTP responses into errors.

use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Short, non-revealing fingerprint of a response body for logs.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// `message` field of a JSON error body, as returned by the site API.
pub(crate) fn site_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    non_empty_str(value.get("message"))
}

/// Error text from a GoTrue or PostgREST body.
///
/// GoTrue uses `msg` or `error_description`; PostgREST uses `message`;
/// some paths only set `error`.
pub(crate) fn backend_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| non_empty_str(value.get(*key)))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
