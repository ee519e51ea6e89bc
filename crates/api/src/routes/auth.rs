//! Account routes: registration, login, profile, email verification,
//! password reset

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_entitlements::{build_effective_user, TierSource, TrialSummary};
use codescribe_shared::{PlatformRole, Tier, TierFeatures, User};

use crate::{
    auth::{hash_password, validate_password_strength, verify_password, AuthUser, TokenPurpose},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: ProfileResponse,
}

/// The effective view of an account, as returned to clients
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub platform_role: PlatformRole,
    pub billed_tier: Tier,
    pub effective_tier: Tier,
    pub tier_source: TierSource,
    pub trial: Option<TrialSummary>,
    pub features: TierFeatures,
}

impl From<AuthUser> for ProfileResponse {
    fn from(user: AuthUser) -> Self {
        let features = user.features();
        Self {
            id: user.user_id,
            email: user.email,
            platform_role: user.platform_role,
            billed_tier: user.billed_tier,
            effective_tier: user.effective_tier,
            tier_source: user.tier_source,
            trial: user.trial,
            features,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenConfirmRequest {
    pub token: String,
}

// =============================================================================
// Helpers
// =============================================================================

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> ApiResult<()> {
    if email.len() > 255 || !email.contains('@') || !email.split('@').nth(1).is_some_and(|d| d.contains('.')) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

/// Build the profile view for a freshly loaded user row
async fn profile_for_user(state: &AppState, user: &User) -> ProfileResponse {
    // Enrichment failures degrade to "no trial"; they never fail the request
    let trial = match state.trials.find_active(user.id).await {
        Ok(trial) => trial,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Trial lookup failed; continuing without trial");
            None
        }
    };

    let effective = build_effective_user(user, trial.as_ref(), OffsetDateTime::now_utc());
    let features = effective.effective_tier.features();

    ProfileResponse {
        id: effective.user_id,
        email: effective.email,
        platform_role: effective.platform_role,
        billed_tier: effective.billed_tier,
        effective_tier: effective.effective_tier,
        tier_source: effective.tier_source,
        trial: effective.trial,
        features,
    }
}

fn issue_token(state: &AppState, user: &User) -> ApiResult<(String, i64)> {
    let role = user.platform_role.to_string();
    let (token, _jti) = state
        .jwt_manager
        .generate_access_token(user.id, &user.email, &role)
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Failed to sign access token");
            ApiError::Internal
        })?;
    Ok((token, state.jwt_manager.expiry_seconds()))
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    let email = normalize_email(&request.email);
    validate_email(&email)?;
    validate_password_strength(&request.password).map_err(ApiError::Validation)?;

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Validation("Email already registered".to_string()));
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (email, password_hash)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user_id = %user.id, "User registered");

    // Invite redemption is best-effort at registration: a bad code must not
    // orphan the account that was just created
    if let Some(code) = request.invite_code.as_deref() {
        match state.programs.redeem_invite(user.id, code).await {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Invite redemption failed during registration");
            }
        }
    }

    // Auto-campaign grant; eligibility rules make this a no-op when the
    // invite above already granted a trial
    if let Err(e) = state.programs.auto_campaign_grant(user.id).await {
        tracing::warn!(user_id = %user.id, error = %e, "Auto-campaign grant failed during registration");
    }

    // Verification email (fire and forget)
    match state
        .token_manager
        .generate(user.id, TokenPurpose::EmailVerify, 24)
        .await
    {
        Ok(raw_token) => {
            let email_service = state.email.clone();
            let to = user.email.clone();
            let verify_url = format!(
                "{}/verify-email?token={}",
                state.config.app_base_url, raw_token
            );
            tokio::spawn(async move {
                email_service.send_verification_email(&to, &verify_url).await;
            });
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = ?e, "Failed to create verification token");
        }
    }

    let (access_token, expires_in) = issue_token(&state, &user)?;
    let profile = profile_for_user(&state, &user).await;

    Ok(Json(AuthTokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        user: profile,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    let email = normalize_email(&request.email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        return Err(ApiError::Unauthorized);
    };

    if !verify_password(&request.password, &user.password_hash) {
        tracing::warn!(user_id = %user.id, "Login failed: bad password");
        return Err(ApiError::Unauthorized);
    }

    // Last-login stamp (fire and forget)
    let pool = state.pool.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        let _ = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&pool)
            .await;
    });

    let (access_token, expires_in) = issue_token(&state, &user)?;
    let profile = profile_for_user(&state, &user).await;

    Ok(Json(AuthTokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        user: profile,
    }))
}

pub async fn me(Extension(auth_user): Extension<AuthUser>) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(auth_user))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = normalize_email(&request.email);
    validate_email(&email)?;

    let limit = state.password_reset_limiter.check(&email).await;
    if !limit.allowed {
        return Err(ApiError::RateLimited {
            retry_after_seconds: limit.retry_after_seconds.unwrap_or(60),
        });
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    if let Some(user) = user {
        let raw_token = state
            .token_manager
            .generate(user.id, TokenPurpose::PasswordReset, 2)
            .await?;

        let email_service = state.email.clone();
        let to = user.email.clone();
        let reset_url = format!(
            "{}/reset-password?token={}",
            state.config.app_base_url, raw_token
        );
        tokio::spawn(async move {
            email_service.send_password_reset_email(&to, &reset_url).await;
        });
    }

    // Identical response whether or not the address exists
    Ok(Json(json!({
        "message": "If that address has an account, a reset link has been sent."
    })))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_password_strength(&request.new_password).map_err(ApiError::Validation)?;

    let user_id = state
        .token_manager
        .consume(&request.token, TokenPurpose::PasswordReset)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid or expired reset token".to_string()))?;

    let password_hash = hash_password(&request.new_password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(&password_hash)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %user_id, "Password reset completed");

    Ok(Json(json!({ "message": "Password updated." })))
}

pub async fn request_email_verification(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let already_verified: Option<bool> =
        sqlx::query_scalar("SELECT email_verified FROM users WHERE id = $1")
            .bind(auth_user.user_id)
            .fetch_optional(&state.pool)
            .await?;

    if already_verified.unwrap_or(false) {
        return Err(ApiError::Validation(
            "Email is already verified".to_string(),
        ));
    }

    let limit = state.email_verify_limiter.check(&auth_user.email).await;
    if !limit.allowed {
        return Err(ApiError::RateLimited {
            retry_after_seconds: limit.retry_after_seconds.unwrap_or(60),
        });
    }

    let raw_token = state
        .token_manager
        .generate(auth_user.user_id, TokenPurpose::EmailVerify, 24)
        .await?;

    let email_service = state.email.clone();
    let to = auth_user.email.clone();
    let verify_url = format!(
        "{}/verify-email?token={}",
        state.config.app_base_url, raw_token
    );
    tokio::spawn(async move {
        email_service.send_verification_email(&to, &verify_url).await;
    });

    Ok(Json(json!({ "message": "Verification email sent." })))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Json(request): Json<TokenConfirmRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = state
        .token_manager
        .consume(&request.token, TokenPurpose::EmailVerify)
        .await?
        .ok_or_else(|| {
            ApiError::Validation("Invalid or expired verification token".to_string())
        })?;

    sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %user_id, "Email verified");

    Ok(Json(json!({ "message": "Email verified." })))
}
