//! # Configuration Management
//!
//! Configuration comes from the environment ("12-factor" style), with a `.env`
//! file loaded first for local development.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite connection string (default: `sqlite:webauthn.db?mode=rwc`)
//! - `RP_ORIGIN`: Relying Party origin, e.g. `https://fit.example.com` (**required**)
//! - `RP_ID`: Relying Party ID (default: the host of `RP_ORIGIN`)
//! - `RP_NAME`: Name shown by the authenticator (default: FitTrack)
//! - `CHALLENGE_TIMEOUT_SECS`: Challenge lifetime, 30..=600 (default: 60)
//! - `CHALLENGE_STORE`: `memory` or `sqlite` (default: memory)
//! - `CORS_ALLOWED_ORIGIN`: The one origin allowed cross-origin (default: `RP_ORIGIN`)
//! - `CONTENT_SECURITY_POLICY`: CSP header value (default: derived from `RP_ORIGIN`)
//! - `SESSION_INACTIVITY_HOURS`: Session lifetime without activity (default: 24)
//!
//! A missing or invalid origin is a startup error. The RP ID is never guessed
//! from the machine's hostname.

use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;
use url::Url;

/// Where outstanding challenges are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeBackend {
    /// Process-local; lost on restart, not shared between instances
    Memory,
    /// The `challenges` table in the application database
    Sqlite,
}

impl FromStr for ChallengeBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(ChallengeBackend::Memory),
            "sqlite" => Ok(ChallengeBackend::Sqlite),
            other => bail!("CHALLENGE_STORE must be 'memory' or 'sqlite', got '{other}'"),
        }
    }
}

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: this service, the party that relies on the authenticator
/// - **RP ID**: the domain credentials are scoped to (e.g. `example.com`)
/// - **RP Origin**: the exact scheme + host + port the browser reports
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Format: `sqlite:filename.db?mode=rwc` (read, write, create)
    pub database_url: String,

    pub rp_id: String,

    /// Serialized without a trailing slash, the way browsers put it in client data
    pub rp_origin: String,

    pub rp_name: String,

    pub challenge_timeout_secs: u64,
    pub challenge_backend: ChallengeBackend,

    pub cors_allowed_origin: String,
    pub content_security_policy: String,
    pub session_inactivity_hours: i64,
}

pub const MIN_CHALLENGE_TIMEOUT_SECS: u64 = 30;
pub const MAX_CHALLENGE_TIMEOUT_SECS: u64 = 600;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// ## Example .env file
    /// ```text
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=FitTrack
    /// DATABASE_URL=sqlite:webauthn.db?mode=rwc
    /// CHALLENGE_TIMEOUT_SECS=60
    /// ```
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("PORT", "8080")
            .parse()
            .context("PORT must be a number between 1 and 65535")?;

        let origin_raw = lookup("RP_ORIGIN").ok_or_else(|| anyhow!("RP_ORIGIN must be set"))?;
        let origin = Url::parse(&origin_raw)
            .with_context(|| format!("RP_ORIGIN '{origin_raw}' is not a valid URL"))?;
        let host = origin
            .host_str()
            .ok_or_else(|| anyhow!("RP_ORIGIN '{origin_raw}' has no host"))?
            .to_ascii_lowercase();

        let is_localhost = host == "localhost";
        if origin.scheme() != "https" && !(is_localhost && origin.scheme() == "http") {
            bail!("RP_ORIGIN must use https (plain http is only allowed for localhost)");
        }
        if origin.path() != "/" || origin.query().is_some() || origin.fragment().is_some() {
            bail!("RP_ORIGIN must be an origin only, without path, query or fragment");
        }
        let rp_origin = origin.origin().ascii_serialization();

        let rp_id = lookup("RP_ID").unwrap_or_else(|| host.clone()).to_ascii_lowercase();
        if !rp_id_covers_host(&rp_id, &host) {
            bail!("RP_ID '{rp_id}' is neither the host of RP_ORIGIN nor a parent domain of it");
        }

        let challenge_timeout_secs: u64 = var("CHALLENGE_TIMEOUT_SECS", "60")
            .parse()
            .context("CHALLENGE_TIMEOUT_SECS must be a whole number of seconds")?;
        if !(MIN_CHALLENGE_TIMEOUT_SECS..=MAX_CHALLENGE_TIMEOUT_SECS)
            .contains(&challenge_timeout_secs)
        {
            bail!(
                "CHALLENGE_TIMEOUT_SECS must be between {MIN_CHALLENGE_TIMEOUT_SECS} and {MAX_CHALLENGE_TIMEOUT_SECS}"
            );
        }

        let session_inactivity_hours: i64 = var("SESSION_INACTIVITY_HOURS", "24")
            .parse()
            .context("SESSION_INACTIVITY_HOURS must be a number")?;
        if session_inactivity_hours <= 0 {
            bail!("SESSION_INACTIVITY_HOURS must be positive");
        }

        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN").unwrap_or_else(|| rp_origin.clone());
        let content_security_policy = lookup("CONTENT_SECURITY_POLICY")
            .unwrap_or_else(|| default_csp(&rp_origin));

        Ok(Config {
            host: var("HOST", "127.0.0.1"),
            port,
            database_url: var("DATABASE_URL", "sqlite:webauthn.db?mode=rwc"),
            rp_id,
            rp_origin,
            rp_name: var("RP_NAME", "FitTrack"),
            challenge_timeout_secs,
            challenge_backend: var("CHALLENGE_STORE", "memory").parse()?,
            cors_allowed_origin,
            content_security_policy,
            session_inactivity_hours,
        })
    }

    /// Example: "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An RP ID is valid for a host when it is the host itself or a parent domain
/// on a label boundary (`example.com` covers `fit.example.com`, not `badexample.com`).
fn rp_id_covers_host(rp_id: &str, host: &str) -> bool {
    if rp_id.is_empty() || rp_id.starts_with('.') {
        return false;
    }
    host == rp_id
        || (host.len() > rp_id.len()
            && host.ends_with(rp_id)
            && host.as_bytes()[host.len() - rp_id.len() - 1] == b'.')
}

fn default_csp(rp_origin: &str) -> String {
    format!(
        "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; \
         connect-src 'self' {rp_origin}; object-src 'none'; frame-ancestors 'none'; base-uri 'self'; \
         form-action 'self'"
    )
}
