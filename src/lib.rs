//! # Biometric Authentication Core
//!
//! WebAuthn/FIDO2 registration and authentication for platform biometric
//! authenticators (fingerprint, face), without passwords.
//!
//! ## Modules
//! - [`encoding`]: base64url text form of every binary value on the wire
//! - [`challenge`]: single-use, expiring challenges per user and ceremony
//! - [`registry`]: registered credentials and the signature counter rule
//! - [`webauthn`]: the ceremony engine that verifies client responses
//! - [`client`]: client-side ceremony adapter over a platform authenticator
//! - [`handlers`], [`routes`], [`middleware`]: the HTTP surface
//! - [`db`]: SQLite-backed stores

pub mod challenge;
pub mod client;
pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;
pub mod webauthn;
