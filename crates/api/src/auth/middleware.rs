//! Authentication middleware for Axum
//!
//! Verifies the bearer JWT, loads the user row, enriches it with the active
//! trial, and attaches the resolved effective view to the request. Trial
//! lookup failures degrade to "no trial" so they never block authentication.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_entitlements::{
    build_effective_user, TierSource, TrialService, TrialSummary,
};
use codescribe_shared::{Feature, PlatformRole, Tier, TierFeatures, User};

use super::jwt::JwtManager;
use crate::error::ApiError;

/// Everything the auth middleware needs per request
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
    pub trials: TrialService,
}

/// Authenticated user information attached to requests
///
/// The effective tier is re-derived on every request; nothing here is cached
/// across requests because overrides and trials expire by wall clock.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub platform_role: PlatformRole,
    /// Billed tier, untouched by overrides and trials
    pub billed_tier: Tier,
    pub effective_tier: Tier,
    pub tier_source: TierSource,
    pub trial: Option<TrialSummary>,
}

impl AuthUser {
    /// Feature flags and limits for the effective tier
    pub fn features(&self) -> TierFeatures {
        self.effective_tier.features()
    }

    /// Gate a handler on a feature of the effective tier
    pub fn require_feature(&self, feature: Feature) -> Result<(), ApiError> {
        if self.effective_tier.has_feature(feature) {
            Ok(())
        } else {
            Err(ApiError::FeatureNotAvailable(format!(
                "The {} feature is not available on the {} tier",
                feature.as_str(),
                self.effective_tier
            )))
        }
    }
}

/// Read the token from the HttpOnly auth cookie set by the frontend
fn extract_token_from_cookie(request: &Request) -> Option<String> {
    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            for cookie in cookies.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("codescribe_auth_token=") {
                    return Some(token.to_string());
                }
            }
            None
        })
}

/// Bearer token from the Authorization header, with a cookie fallback for
/// SPA clients
fn extract_bearer_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    extract_token_from_cookie(request)
}

/// Reject the request unless it carries a valid token for a live account
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(&request) {
        Some(token) => authenticate(&auth_state, &token).await,
        None => {
            tracing::warn!(path = %path, "require_auth: no bearer token (header or cookie)");
            Err(AuthError::MissingAuth)
        }
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                effective_tier = %auth_user.effective_tier,
                tier_source = ?auth_user.tier_source,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

async fn authenticate(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    let claims = auth_state
        .jwt_manager
        .validate_access_token(token)
        .map_err(|_| AuthError::InvalidToken)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&auth_state.pool)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %claims.sub, error = %e, "User lookup failed during auth");
            AuthError::DatabaseError
        })?;

    let Some(user) = user else {
        // Stale token for a deleted account
        tracing::warn!(user_id = %claims.sub, "JWT user not found in database");
        return Err(AuthError::InvalidToken);
    };

    // Trial enrichment must never block authentication: a failed lookup is
    // logged and treated as "no trial"
    let trial = match auth_state.trials.find_active(user.id).await {
        Ok(trial) => trial,
        Err(e) => {
            tracing::error!(
                user_id = %user.id,
                error = %e,
                "Trial lookup failed during auth; continuing without trial"
            );
            None
        }
    };

    let effective = build_effective_user(&user, trial.as_ref(), OffsetDateTime::now_utc());

    Ok(AuthUser {
        user_id: effective.user_id,
        email: effective.email,
        platform_role: effective.platform_role,
        billed_tier: effective.billed_tier,
        effective_tier: effective.effective_tier,
        tier_source: effective.tier_source,
        trial: effective.trial,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Database error")]
    DatabaseError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::DatabaseError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
