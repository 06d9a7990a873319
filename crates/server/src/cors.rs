// CORS configuration for the collaboration server.
//
// The allowed-origin list comes from `ServerConfig` (the
// `COEDIT_CORS_ORIGINS` variable, comma-separated). Falls back to
// permissive localhost defaults in development.

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Origins allowed when no configuration is provided. Covers the dev
/// ports used by the reference web clients (Next.js and Vite).
const DEFAULT_DEV_ORIGINS: &str =
    "http://localhost:3000,http://localhost:5173,http://127.0.0.1:3000,http://127.0.0.1:5173";

/// Build a [`CorsLayer`] from the configured origin list.
///
/// - `"*"` allows any origin (and drops credentials, which browsers
///   require for wildcard origins).
/// - A comma-separated list allows exactly those origins.
/// - `None` allows the default development origins.
pub fn cors_layer(configured_origins: Option<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, REQUEST_ID])
        .expose_headers([REQUEST_ID])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match configured_origins.as_deref() {
        Some("*") => base.allow_origin(AllowOrigin::any()).allow_credentials(false),
        Some(origins) => base.allow_origin(parse_origins(origins)),
        None => base.allow_origin(parse_origins(DEFAULT_DEV_ORIGINS)),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    let mut origins = Vec::new();
    for entry in comma_separated.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(entry) {
            origins.push(value);
        }
    }
    origins
}
