// Entitlements crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! CodeScribe Entitlements Module
//!
//! Decides what tier a request is actually served at, and manages the trial
//! lifecycle that feeds into that decision.
//!
//! ## Features
//!
//! - **Effective Tier Resolution**: pure precedence over staff override,
//!   billed tier, and active trial — re-derived on every request
//! - **Trial Lifecycle**: grant, lazy expiry, extend, cancel, convert
//! - **Eligibility**: one active trial per user, cooldown between trials
//! - **Invite Codes & Trial Programs**: redemption and auto-campaign grants
//! - **Invariants**: executable SQL consistency checks

pub mod error;
pub mod invariants;
pub mod programs;
pub mod resolver;
pub mod trials;

#[cfg(test)]
mod edge_case_tests;

// Error
pub use error::{EntitlementError, EntitlementResult};

// Resolver
pub use resolver::{
    build_effective_user, resolve_effective_tier, EffectiveUser, TierSource, TrialSummary,
};

// Trials
pub use trials::{
    evaluate_eligibility, Eligibility, GrantOutcome, GrantTrialParams, TrialConfig, TrialService,
};

// Programs
pub use programs::ProgramService;

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};
