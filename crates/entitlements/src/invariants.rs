//! Entitlement Invariants Module
//!
//! Provides runnable consistency checks for the entitlement system. These
//! can be run after any mutation (or from an admin endpoint) to verify the
//! data is in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::EntitlementResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// User(s) affected
    pub user_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - users may be served the wrong tier
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for multiple active trials violation
#[derive(Debug, sqlx::FromRow)]
struct MultipleActiveTrialsRow {
    user_id: Uuid,
    trial_count: i64,
}

/// Row type for inverted trial window violation
#[derive(Debug, sqlx::FromRow)]
struct BadTrialWindowRow {
    trial_id: Uuid,
    user_id: Uuid,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
}

/// Row type for override-on-non-staff violation
#[derive(Debug, sqlx::FromRow)]
struct NonStaffOverrideRow {
    user_id: Uuid,
    platform_role: String,
    viewing_as_tier: String,
}

/// Row type for dangling override fields violation
#[derive(Debug, sqlx::FromRow)]
struct DanglingOverrideRow {
    user_id: Uuid,
    has_tier: bool,
    has_expiry: bool,
}

/// Runs consistency checks against the entitlement tables
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run every check and summarize
    pub async fn run_all(&self) -> EntitlementResult<InvariantCheckSummary> {
        let mut violations = Vec::new();
        let mut checks_run = 0;

        checks_run += 1;
        violations.extend(self.check_single_active_trial().await?);

        checks_run += 1;
        violations.extend(self.check_trial_window_sane().await?);

        checks_run += 1;
        violations.extend(self.check_override_role_gated().await?);

        checks_run += 1;
        violations.extend(self.check_override_fields_paired().await?);

        let checks_failed = violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        Ok(InvariantCheckSummary {
            checked_at: OffsetDateTime::now_utc(),
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// At most one active trial per user
    ///
    /// Backed by a partial unique index; a violation here means the index
    /// was dropped or bypassed.
    pub async fn check_single_active_trial(&self) -> EntitlementResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleActiveTrialsRow> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*) AS trial_count
            FROM trials
            WHERE status = 'active'
            GROUP BY user_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_active_trial".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "User has {} active trials; the resolver assumes at most one",
                    row.trial_count
                ),
                context: serde_json::json!({ "trial_count": row.trial_count }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Trial windows must run forward
    pub async fn check_trial_window_sane(&self) -> EntitlementResult<Vec<InvariantViolation>> {
        let rows: Vec<BadTrialWindowRow> = sqlx::query_as(
            r#"
            SELECT id AS trial_id, user_id, starts_at, ends_at
            FROM trials
            WHERE ends_at <= starts_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "trial_window_sane".to_string(),
                user_ids: vec![row.user_id],
                description: "Trial ends at or before it starts".to_string(),
                context: serde_json::json!({
                    "trial_id": row.trial_id,
                    "starts_at": row.starts_at.to_string(),
                    "ends_at": row.ends_at.to_string(),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Tier overrides only exist on staff accounts
    ///
    /// The resolver ignores overrides on non-staff roles, so these rows are
    /// inert, but their presence means an unauthorized write path exists.
    pub async fn check_override_role_gated(&self) -> EntitlementResult<Vec<InvariantViolation>> {
        let rows: Vec<NonStaffOverrideRow> = sqlx::query_as(
            r#"
            SELECT id AS user_id, platform_role, viewing_as_tier
            FROM users
            WHERE viewing_as_tier IS NOT NULL
              AND platform_role = 'user'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "override_role_gated".to_string(),
                user_ids: vec![row.user_id],
                description: "Non-staff account carries a tier override".to_string(),
                context: serde_json::json!({
                    "platform_role": row.platform_role,
                    "viewing_as_tier": row.viewing_as_tier,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// `viewing_as_tier` and `override_expires_at` are set and cleared
    /// together
    pub async fn check_override_fields_paired(&self) -> EntitlementResult<Vec<InvariantViolation>> {
        let rows: Vec<DanglingOverrideRow> = sqlx::query_as(
            r#"
            SELECT id AS user_id,
                   (viewing_as_tier IS NOT NULL) AS has_tier,
                   (override_expires_at IS NOT NULL) AS has_expiry
            FROM users
            WHERE (viewing_as_tier IS NULL) <> (override_expires_at IS NULL)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "override_fields_paired".to_string(),
                user_ids: vec![row.user_id],
                description: "Override fields set inconsistently".to_string(),
                context: serde_json::json!({
                    "has_viewing_as_tier": row.has_tier,
                    "has_override_expires_at": row.has_expiry,
                }),
                severity: ViolationSeverity::Low,
            })
            .collect())
    }
}
