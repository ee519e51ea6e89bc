//! Trial routes: self-serve start, invite redemption, current status

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};

use codescribe_entitlements::{Eligibility, GrantOutcome, GrantTrialParams, TrialSummary};
use codescribe_shared::{Tier, Trial, TrialSource};

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct TrialStatusResponse {
    pub trial: Option<TrialSummary>,
    pub eligibility: Eligibility,
}

/// Grant outcome as returned to clients: ineligibility is data, not an error
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial: Option<Trial>,
}

impl From<GrantOutcome> for GrantResponse {
    fn from(outcome: GrantOutcome) -> Self {
        match outcome {
            GrantOutcome::Granted(trial) => Self {
                granted: true,
                reason: None,
                trial: Some(trial),
            },
            GrantOutcome::Ineligible(eligibility) => Self {
                granted: false,
                reason: eligibility.reason,
                trial: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemInviteRequest {
    pub code: String,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn current_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<TrialStatusResponse>> {
    let eligibility = state.trials.check_eligibility(auth_user.user_id).await?;

    Ok(Json(TrialStatusResponse {
        trial: auth_user.trial,
        eligibility,
    }))
}

/// Self-serve trial of the default tier
pub async fn start_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<GrantResponse>> {
    let outcome = state
        .trials
        .grant(GrantTrialParams {
            user_id: auth_user.user_id,
            trial_tier: Tier::Pro,
            duration_days: state.trials.config().default_duration_days,
            source: TrialSource::SelfServe,
            granted_by: None,
            invite_code_id: None,
            trial_program_id: None,
            force: false,
        })
        .await?;

    if let GrantOutcome::Granted(ref trial) = outcome {
        let email_service = state.email.clone();
        let to = auth_user.email.clone();
        let tier = trial.trial_tier.unwrap_or(Tier::Pro).to_string();
        let ends_at = trial.ends_at.to_string();
        tokio::spawn(async move {
            email_service
                .send_trial_started_email(&to, &tier, &ends_at)
                .await;
        });
    }

    Ok(Json(GrantResponse::from(outcome)))
}

pub async fn redeem_invite(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<RedeemInviteRequest>,
) -> ApiResult<Json<GrantResponse>> {
    let outcome = state
        .programs
        .redeem_invite(auth_user.user_id, &request.code)
        .await?;

    Ok(Json(GrantResponse::from(outcome)))
}
