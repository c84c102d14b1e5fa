//! # WebAuthn Module
//!
//! Server side of the two WebAuthn ceremonies, verified by hand against the
//! challenge store and credential registry.
//!
//! ## Submodules
//! - `types`: JSON shapes of options, responses and results
//! - `client_data`: parsing and hashing of `clientDataJSON`
//! - `authenticator_data`: the binary authenticator data and attestation object
//! - `cose`: COSE public keys and signature checks (ES256, EdDSA)
//! - `engine`: [`CeremonyEngine`], the relying party and shared checks
//! - `registration`: creating new credentials
//! - `authentication`: signing in with an existing credential
//!
//! ## Flow Overview
//!
//! ### Registration
//! 1. Client asks for options → [`CeremonyEngine::begin_registration`]
//! 2. Platform authenticator creates a key pair after a biometric check
//! 3. Client posts the attestation → [`CeremonyEngine::complete_registration`]
//! 4. Server checks challenge, origin and RP ID hash, then stores the public key
//!
//! ### Authentication
//! 1. Client asks for options → [`CeremonyEngine::begin_authentication`]
//! 2. Platform authenticator signs the challenge after a biometric check
//! 3. Client posts the assertion → [`CeremonyEngine::complete_authentication`]
//! 4. Server verifies the signature and advances the signature counter
//! 5. The HTTP layer binds the user to the session

pub mod authentication;
pub mod authenticator_data;
pub mod client_data;
pub mod cose;
pub mod engine;
pub mod registration;
pub mod types;

pub use engine::{CeremonyEngine, RelyingParty};
