// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! CodeScribe API Library
//!
//! This crate contains the API server components for CodeScribe:
//! authentication, trial and tier-override administration, documentation
//! generation, and batch endpoints.

pub mod auth;
pub mod config;
pub mod docgen;
pub mod email;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
