//! Invite codes and auto-campaign trial programs
//!
//! Both are bookkeeping over the trial grant path: an invite code records
//! who was let in under which terms, a trial program grants a trial to every
//! registration while it is active.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_shared::{InviteCode, Trial, TrialProgram, TrialSource};

use crate::error::{EntitlementError, EntitlementResult};
use crate::trials::{GrantOutcome, GrantTrialParams, TrialService};

/// Invite redemption and trial program grants
#[derive(Clone)]
pub struct ProgramService {
    pool: PgPool,
    trials: TrialService,
}

impl ProgramService {
    pub fn new(pool: PgPool, trials: TrialService) -> Self {
        Self { pool, trials }
    }

    /// Redeem an invite code for the user
    ///
    /// Bad codes are validation errors; an ineligible user gets the
    /// structured rejection and the code's use count is left untouched.
    pub async fn redeem_invite(&self, user_id: Uuid, code: &str) -> EntitlementResult<GrantOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EntitlementError::Validation(
                "Invite code is required".to_string(),
            ));
        }

        let invite: Option<InviteCode> =
            sqlx::query_as("SELECT * FROM invite_codes WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        let Some(invite) = invite else {
            return Err(EntitlementError::Validation(
                "Invalid invite code".to_string(),
            ));
        };

        if !invite.is_redeemable_at(OffsetDateTime::now_utc()) {
            return Err(EntitlementError::Validation(
                "Invite code has expired or been fully redeemed".to_string(),
            ));
        }

        let outcome = self
            .trials
            .grant(GrantTrialParams {
                user_id,
                trial_tier: invite.trial_tier,
                duration_days: invite.duration_days as i64,
                source: TrialSource::Invite,
                granted_by: invite.created_by,
                invite_code_id: Some(invite.id),
                trial_program_id: None,
                force: false,
            })
            .await?;

        if let GrantOutcome::Granted(ref trial) = outcome {
            // Bookkeeping only; the trial stands even if this write fails
            let counted =
                sqlx::query("UPDATE invite_codes SET use_count = use_count + 1 WHERE id = $1")
                    .bind(invite.id)
                    .execute(&self.pool)
                    .await;

            if let Err(e) = counted {
                tracing::error!(
                    invite_code_id = %invite.id,
                    trial_id = %trial.id,
                    error = %e,
                    "Failed to increment invite code use count"
                );
            }
        }

        Ok(outcome)
    }

    /// Grant the currently active trial program's trial to a new
    /// registration, if a program is running
    ///
    /// Returns None when no program is active or the user is ineligible;
    /// registration never fails because of this path.
    pub async fn auto_campaign_grant(&self, user_id: Uuid) -> EntitlementResult<Option<Trial>> {
        let program: Option<TrialProgram> = sqlx::query_as(
            "SELECT * FROM trial_programs WHERE active = TRUE ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(program) = program else {
            return Ok(None);
        };

        let outcome = self
            .trials
            .grant(GrantTrialParams {
                user_id,
                trial_tier: program.trial_tier,
                duration_days: program.duration_days as i64,
                source: TrialSource::AutoCampaign,
                granted_by: None,
                invite_code_id: None,
                trial_program_id: Some(program.id),
                force: false,
            })
            .await?;

        match outcome {
            GrantOutcome::Granted(trial) => {
                tracing::info!(
                    user_id = %user_id,
                    program_id = %program.id,
                    program_name = %program.name,
                    trial_id = %trial.id,
                    "Auto-campaign trial granted"
                );
                Ok(Some(trial))
            }
            GrantOutcome::Ineligible(eligibility) => {
                tracing::debug!(
                    user_id = %user_id,
                    program_id = %program.id,
                    reason = ?eligibility.reason,
                    "Auto-campaign grant skipped"
                );
                Ok(None)
            }
        }
    }
}
