//! # Middleware Module
//!
//! Response-shaping layers applied to every route:
//! - CORS for the single configured front-end origin, with cookies allowed
//! - a `Content-Security-Policy` header unless a handler already set one
//!
//! Both are built from [`Config`] at startup. Nothing in a request can widen them.

use crate::config::Config;
use anyhow::{Context, Result};
use axum::http::{
    header::{self, HeaderName},
    HeaderValue, Method,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};

/// How long browsers may cache a preflight answer.
pub const CORS_MAX_AGE: Duration = Duration::from_secs(600);

/// CORS for the configured origin.
///
/// Credentials are allowed so the session cookie travels with ceremony
/// requests, which is why the origin cannot be a wildcard.
pub fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(&config.cors_allowed_origin)
        .with_context(|| format!("invalid CORS origin '{}'", config.cors_allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::WWW_AUTHENTICATE, header::AUTHORIZATION])
        .max_age(CORS_MAX_AGE))
}

/// Content-Security-Policy on every response that does not carry its own.
pub fn csp_layer(config: &Config) -> Result<SetResponseHeaderLayer<HeaderValue>> {
    let policy = HeaderValue::from_str(&config.content_security_policy)
        .context("CONTENT_SECURITY_POLICY is not a valid header value")?;

    Ok(SetResponseHeaderLayer::if_not_present(
        HeaderName::from_static("content-security-policy"),
        policy,
    ))
}
