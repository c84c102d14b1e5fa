//! # HTTP Request Handlers
//!
//! ## Submodules
//! - `auth`: the four ceremony endpoints (challenge + verify for each ceremony)
//! - `health`: liveness and database probe
//!
//! Handlers extract the path and JSON body, call the ceremony engine and
//! return JSON. Failures go through [`crate::error::AppError`].

pub mod auth;
pub mod health;
