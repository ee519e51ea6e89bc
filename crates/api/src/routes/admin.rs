//! Platform Admin routes
//!
//! Protected by platform role: admin and super_admin can write, support can
//! read but not write. Every mutating action lands in the audit log.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_entitlements::{
    resolve_effective_tier, GrantOutcome, GrantTrialParams, InvariantCheckSummary,
    InvariantChecker, TierSource,
};
use codescribe_shared::{
    InviteCode, PaginatedResponse, PlatformRole, Tier, Trial, TrialSource, User,
};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::trials::GrantResponse,
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminUserListResponse {
    pub users: Vec<AdminUserSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminUserSummary {
    pub id: Uuid,
    pub email: String,
    pub billed_tier: Tier,
    pub effective_tier: Tier,
    pub platform_role: PlatformRole,
    pub email_verified: bool,
    pub has_active_trial: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct AdminUserDetailResponse {
    pub id: Uuid,
    pub email: String,
    pub billed_tier: Tier,
    pub effective_tier: Tier,
    pub tier_source: TierSource,
    pub platform_role: PlatformRole,
    pub email_verified: bool,
    pub override_info: Option<OverrideInfo>,
    pub trials: Vec<Trial>,
    pub usage: UsageSummary,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct OverrideInfo {
    pub viewing_as_tier: Tier,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub applied_at: Option<OffsetDateTime>,
    pub applied_by: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UsageSummary {
    pub documents_total: i64,
    pub documents_this_month: i64,
    pub tokens_this_month: i64,
    pub monthly_limit: u64,
    pub is_over_limit: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub viewing_as_tier: String,
    pub duration_hours: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub user_id: Uuid,
    pub viewing_as_tier: Tier,
    #[serde(with = "time::serde::rfc3339")]
    pub override_expires_at: OffsetDateTime,
    pub effective_tier: Tier,
}

#[derive(Debug, Deserialize)]
pub struct AdminGrantTrialRequest {
    pub trial_tier: Option<String>,
    pub duration_days: Option<i64>,
    pub force: Option<bool>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendTrialRequest {
    pub days: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteCodeRequest {
    pub code: Option<String>,
    pub trial_tier: Option<String>,
    pub duration_days: Option<i32>,
    pub max_uses: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct ListInviteCodesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlatformStatsResponse {
    pub total_users: i64,
    pub users_by_tier: HashMap<String, i64>,
    pub active_trials: i64,
    pub trials_by_source: HashMap<String, i64>,
    pub documents_today: i64,
    pub documents_this_month: i64,
    pub tokens_this_month: i64,
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct TierCountRow {
    tier: Tier,
    count: i64,
}

#[derive(Debug, FromRow)]
struct SourceCountRow {
    source: TrialSource,
    count: i64,
}

#[derive(Debug, FromRow)]
struct UsageRow {
    documents_total: i64,
    documents_this_month: i64,
    tokens_this_month: i64,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Check that the authenticated user has platform admin privileges
///
/// Support can read but not write.
fn require_platform_admin(auth_user: &AuthUser, require_write: bool) -> ApiResult<Uuid> {
    let allowed = if require_write {
        auth_user.platform_role.can_admin_write()
    } else {
        auth_user.platform_role.can_admin_read()
    };

    if !allowed {
        tracing::warn!(
            user_id = %auth_user.user_id,
            platform_role = %auth_user.platform_role,
            require_write,
            "Unauthorized admin access attempt"
        );
        return Err(ApiError::Forbidden);
    }

    Ok(auth_user.user_id)
}

/// Write an admin action to the audit log
///
/// Audit failures fail the request: an unaudited admin mutation must not
/// look like a success.
async fn log_admin_action(
    pool: &sqlx::PgPool,
    admin_user_id: Uuid,
    action: &str,
    target_type: &str,
    target_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_audit_log (admin_user_id, action, target_type, target_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(admin_user_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(details)
    .execute(pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, action = %action, "Failed to write audit log");
        ApiError::Internal
    })?;

    Ok(())
}

async fn fetch_user(pool: &sqlx::PgPool, user_id: Uuid) -> ApiResult<User> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    user.ok_or(ApiError::NotFound)
}

fn parse_tier(value: &str) -> ApiResult<Tier> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid tier name: {}", value)))
}

// =============================================================================
// User Handlers
// =============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<AdminUserListResponse>> {
    require_platform_admin(&auth_user, false)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(25).clamp(1, 100);
    let offset = (page - 1) * limit;

    let search = query.search.unwrap_or_default();
    if let Some(tier) = query.tier.as_deref() {
        // Fail loudly on a bad filter rather than returning everything
        parse_tier(tier)?;
    }
    let tier = query.tier.unwrap_or_default();

    let users: Vec<User> = sqlx::query_as(
        r#"
        SELECT * FROM users
        WHERE ($1 = '' OR email ILIKE '%' || $1 || '%')
          AND ($2 = '' OR tier = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(&search)
    .bind(&tier)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users
        WHERE ($1 = '' OR email ILIKE '%' || $1 || '%')
          AND ($2 = '' OR tier = $2)
        "#,
    )
    .bind(&search)
    .bind(&tier)
    .fetch_one(&state.pool)
    .await?;

    // One round trip for the page's active trials
    let user_ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let trials: Vec<Trial> =
        sqlx::query_as("SELECT * FROM trials WHERE user_id = ANY($1) AND status = 'active'")
            .bind(&user_ids)
            .fetch_all(&state.pool)
            .await?;

    let now = OffsetDateTime::now_utc();
    let summaries = users
        .into_iter()
        .map(|user| {
            let trial = trials.iter().find(|t| t.user_id == user.id);
            let effective_tier = resolve_effective_tier(&user, trial, now);
            AdminUserSummary {
                id: user.id,
                email: user.email,
                billed_tier: user.tier,
                effective_tier,
                platform_role: user.platform_role,
                email_verified: user.email_verified,
                has_active_trial: trial.map(|t| t.is_active_at(now)).unwrap_or(false),
                created_at: user.created_at,
            }
        })
        .collect();

    Ok(Json(AdminUserListResponse {
        users: summaries,
        total,
        page,
        limit,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<AdminUserDetailResponse>> {
    require_platform_admin(&auth_user, false)?;

    let user = fetch_user(&state.pool, user_id).await?;
    let trials = state.trials.history(user_id).await?;

    let now = OffsetDateTime::now_utc();
    let active_trial = trials.iter().find(|t| t.is_active_at(now));
    let effective = codescribe_entitlements::build_effective_user(&user, active_trial, now);

    let usage: UsageRow = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) AS documents_total,
            COUNT(*) FILTER (WHERE created_at >= date_trunc('month', NOW())) AS documents_this_month,
            COALESCE(SUM(tokens_used) FILTER (WHERE created_at >= date_trunc('month', NOW())), 0)::BIGINT AS tokens_this_month
        FROM documents
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    let monthly_limit = effective.effective_tier.features().monthly_generations;
    let is_over_limit = (usage.documents_this_month as u64) >= monthly_limit;

    let override_info = match (user.viewing_as_tier, user.override_expires_at) {
        (Some(viewing_as_tier), Some(expires_at)) => Some(OverrideInfo {
            viewing_as_tier,
            expires_at,
            reason: user.override_reason.clone(),
            applied_at: user.override_applied_at,
            applied_by: user.override_applied_by,
        }),
        _ => None,
    };

    Ok(Json(AdminUserDetailResponse {
        id: user.id,
        email: user.email,
        billed_tier: user.tier,
        effective_tier: effective.effective_tier,
        tier_source: effective.tier_source,
        platform_role: user.platform_role,
        email_verified: user.email_verified,
        override_info,
        trials,
        usage: UsageSummary {
            documents_total: usage.documents_total,
            documents_this_month: usage.documents_this_month,
            tokens_this_month: usage.tokens_this_month,
            monthly_limit,
            is_over_limit,
        },
        last_login_at: user.last_login_at,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }))
}

// =============================================================================
// Tier Override Handlers
// =============================================================================

pub async fn set_tier_override(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetOverrideRequest>,
) -> ApiResult<Json<OverrideResponse>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let viewing_as_tier = parse_tier(&request.viewing_as_tier)?;

    let reason = request.reason.trim().to_string();
    if reason.len() < 10 {
        return Err(ApiError::Validation(
            "Override reason must be at least 10 characters".to_string(),
        ));
    }

    if request.duration_hours < 1 || request.duration_hours > state.config.max_override_hours {
        return Err(ApiError::Validation(format!(
            "Override duration must be between 1 and {} hours",
            state.config.max_override_hours
        )));
    }

    let target = fetch_user(&state.pool, user_id).await?;
    // The resolver only honors overrides on staff accounts; refuse to write
    // rows it would ignore
    if !target.platform_role.is_staff() {
        return Err(ApiError::Validation(
            "Tier overrides can only be applied to staff accounts".to_string(),
        ));
    }

    let updated: User = sqlx::query_as(
        r#"
        UPDATE users
        SET viewing_as_tier = $2,
            override_expires_at = NOW() + make_interval(hours => $3),
            override_reason = $4,
            override_applied_at = NOW(),
            override_applied_by = $5,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(viewing_as_tier)
    .bind(request.duration_hours as i32)
    .bind(&reason)
    .bind(admin_user_id)
    .fetch_one(&state.pool)
    .await?;

    log_admin_action(
        &state.pool,
        admin_user_id,
        "tier_override_set",
        "user",
        Some(user_id),
        Some(json!({
            "viewing_as_tier": viewing_as_tier.to_string(),
            "duration_hours": request.duration_hours,
            "reason": reason,
        })),
    )
    .await?;

    let now = OffsetDateTime::now_utc();
    let effective_tier = resolve_effective_tier(&updated, None, now);
    let override_expires_at = updated.override_expires_at.unwrap_or(now);

    Ok(Json(OverrideResponse {
        user_id,
        viewing_as_tier,
        override_expires_at,
        effective_tier,
    }))
}

pub async fn clear_tier_override(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    // 404 for unknown users, 200 for users with no override: clearing is
    // idempotent
    fetch_user(&state.pool, user_id).await?;

    sqlx::query(
        r#"
        UPDATE users
        SET viewing_as_tier = NULL,
            override_expires_at = NULL,
            override_reason = NULL,
            override_applied_at = NULL,
            override_applied_by = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    log_admin_action(
        &state.pool,
        admin_user_id,
        "tier_override_cleared",
        "user",
        Some(user_id),
        None,
    )
    .await?;

    Ok(Json(json!({ "cleared": true })))
}

// =============================================================================
// Trial Handlers
// =============================================================================

pub async fn grant_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AdminGrantTrialRequest>,
) -> ApiResult<Json<GrantResponse>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let trial_tier = match request.trial_tier.as_deref() {
        Some(value) => parse_tier(value)?,
        None => Tier::Pro,
    };
    let duration_days = request
        .duration_days
        .unwrap_or(state.trials.config().default_duration_days);
    let force = request.force.unwrap_or(false);

    fetch_user(&state.pool, user_id).await?;

    let outcome = state
        .trials
        .grant(GrantTrialParams {
            user_id,
            trial_tier,
            duration_days,
            source: TrialSource::AdminGrant,
            granted_by: Some(admin_user_id),
            invite_code_id: None,
            trial_program_id: None,
            force,
        })
        .await?;

    if let GrantOutcome::Granted(ref trial) = outcome {
        log_admin_action(
            &state.pool,
            admin_user_id,
            "trial_granted",
            "trial",
            Some(trial.id),
            Some(json!({
                "user_id": user_id,
                "trial_tier": trial_tier.to_string(),
                "duration_days": duration_days,
                "force": force,
                "reason": request.reason,
            })),
        )
        .await?;
    }

    Ok(Json(GrantResponse::from(outcome)))
}

pub async fn extend_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(trial_id): Path<Uuid>,
    Json(request): Json<ExtendTrialRequest>,
) -> ApiResult<Json<Trial>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let trial = state.trials.extend(trial_id, request.days).await?;

    log_admin_action(
        &state.pool,
        admin_user_id,
        "trial_extended",
        "trial",
        Some(trial_id),
        Some(json!({ "days": request.days })),
    )
    .await?;

    Ok(Json(trial))
}

pub async fn cancel_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(trial_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let cancelled = state.trials.cancel(trial_id).await?;
    if !cancelled {
        return Err(ApiError::NotFound);
    }

    log_admin_action(
        &state.pool,
        admin_user_id,
        "trial_cancelled",
        "trial",
        Some(trial_id),
        None,
    )
    .await?;

    Ok(Json(json!({ "cancelled": true })))
}

// =============================================================================
// Invite Code Handlers
// =============================================================================

pub async fn create_invite_code(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateInviteCodeRequest>,
) -> ApiResult<Json<InviteCode>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let code = match request.code {
        Some(code) => {
            let code = code.trim().to_uppercase();
            if code.len() < 4
                || code.len() > 64
                || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ApiError::Validation(
                    "Invite codes must be 4-64 alphanumeric characters".to_string(),
                ));
            }
            code
        }
        None => rand::rng()
            .sample_iter(Alphanumeric)
            .take(12)
            .map(char::from)
            .collect::<String>()
            .to_uppercase(),
    };

    let trial_tier = match request.trial_tier.as_deref() {
        Some(value) => parse_tier(value)?,
        None => Tier::Pro,
    };
    let duration_days = request.duration_days.unwrap_or(14);
    if duration_days < 1 || duration_days > 365 {
        return Err(ApiError::Validation(
            "Trial duration must be between 1 and 365 days".to_string(),
        ));
    }
    let max_uses = request.max_uses.unwrap_or(1);
    if max_uses < 1 {
        return Err(ApiError::Validation(
            "max_uses must be at least 1".to_string(),
        ));
    }

    let insert_result: Result<InviteCode, sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO invite_codes (code, trial_tier, duration_days, max_uses, expires_at, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&code)
    .bind(trial_tier)
    .bind(duration_days)
    .bind(max_uses)
    .bind(request.expires_at)
    .bind(admin_user_id)
    .fetch_one(&state.pool)
    .await;

    let invite = match insert_result {
        Ok(invite) => invite,
        Err(e) => {
            let duplicate = e
                .as_database_error()
                .and_then(|db| db.constraint())
                .map(|c| c == "invite_codes_code_key")
                .unwrap_or(false);
            if duplicate {
                return Err(ApiError::Validation(
                    "Invite code already exists".to_string(),
                ));
            }
            return Err(e.into());
        }
    };

    log_admin_action(
        &state.pool,
        admin_user_id,
        "invite_code_created",
        "invite_code",
        Some(invite.id),
        Some(json!({
            "code": invite.code,
            "trial_tier": trial_tier.to_string(),
            "duration_days": duration_days,
            "max_uses": max_uses,
        })),
    )
    .await?;

    Ok(Json(invite))
}

pub async fn list_invite_codes(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListInviteCodesQuery>,
) -> ApiResult<Json<PaginatedResponse<InviteCode>>> {
    require_platform_admin(&auth_user, false)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(25).clamp(1, 100);
    let offset = (page - 1) * limit;

    let codes: Vec<InviteCode> =
        sqlx::query_as("SELECT * FROM invite_codes ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invite_codes")
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(PaginatedResponse::new(codes, total, page, limit)))
}

// =============================================================================
// Stats & Invariants
// =============================================================================

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PlatformStatsResponse>> {
    require_platform_admin(&auth_user, false)?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let tier_counts: Vec<TierCountRow> =
        sqlx::query_as("SELECT tier, COUNT(*) AS count FROM users GROUP BY tier")
            .fetch_all(&state.pool)
            .await?;
    let users_by_tier = tier_counts
        .into_iter()
        .map(|row| (row.tier.to_string(), row.count))
        .collect();

    let active_trials: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trials WHERE status = 'active' AND ends_at > NOW()",
    )
    .fetch_one(&state.pool)
    .await?;

    let source_counts: Vec<SourceCountRow> =
        sqlx::query_as("SELECT source, COUNT(*) AS count FROM trials GROUP BY source")
            .fetch_all(&state.pool)
            .await?;
    let trials_by_source = source_counts
        .into_iter()
        .map(|row| (row.source.to_string(), row.count))
        .collect();

    let docs: UsageRow = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW())) AS documents_total,
            COUNT(*) FILTER (WHERE created_at >= date_trunc('month', NOW())) AS documents_this_month,
            COALESCE(SUM(tokens_used) FILTER (WHERE created_at >= date_trunc('month', NOW())), 0)::BIGINT AS tokens_this_month
        FROM documents
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(PlatformStatsResponse {
        total_users,
        users_by_tier,
        active_trials,
        trials_by_source,
        documents_today: docs.documents_total,
        documents_this_month: docs.documents_this_month,
        tokens_this_month: docs.tokens_this_month,
    }))
}

pub async fn run_invariants(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    require_platform_admin(&auth_user, false)?;

    let summary = InvariantChecker::new(state.pool.clone()).run_all().await?;

    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            "Entitlement invariant violations detected"
        );
    }

    Ok(Json(summary))
}
