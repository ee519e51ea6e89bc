// Shared crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! CodeScribe Shared Library
//!
//! Common types and services used by the API server and the background
//! worker: the tier catalog, trial/role enums, database models, the
//! in-memory action rate limiter, and connection pool helpers.

pub mod catalog;
pub mod db;
pub mod rate_limit;
pub mod types;

pub use catalog::{Feature, TierFeatures};
pub use db::{create_migration_pool, create_pool, run_migrations};
pub use rate_limit::{ActionRateLimiter, RateLimitConfig, RateLimitResult};
pub use types::{
    Batch, BatchStatus, Document, DocumentStatus, InviteCode, PaginatedResponse, PlatformRole,
    Tier, Trial, TrialProgram, TrialSource, TrialStatus, User,
};
