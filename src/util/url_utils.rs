//! Retrieval URLs for node output images.
//!
//! Primary: `{server}{view_endpoint}?filename={path}&ts={token}`
//! Fallback: `{server}{fallback_prefix}/{path}?ts={token}`

use chrono::Utc;

/// Millisecond timestamp appended as `ts` so a reused path is fetched again.
pub fn cache_bust_token() -> i64 {
    Utc::now().timestamp_millis()
}

/// Percent-encode a path component, including `/`
pub fn encode_component(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

pub fn build_view_url(server: &str, view_endpoint: &str, path: &str, token: i64) -> String {
    format!(
        "{}{}?filename={}&ts={}",
        server.trim_end_matches('/'),
        view_endpoint,
        encode_component(path),
        token
    )
}

pub fn build_fallback_url(server: &str, fallback_prefix: &str, path: &str, token: i64) -> String {
    format!(
        "{}{}/{}?ts={}",
        server.trim_end_matches('/'),
        fallback_prefix.trim_end_matches('/'),
        encode_component(path),
        token
    )
}
