//! Trial lifecycle management
//!
//! States: none -> active -> {expired, converted, cancelled}. Expiry is
//! detected lazily on read and persisted by a dispatched task that never
//! blocks the read path; every expiry write is guarded so replays are no-ops.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::sync::oneshot;
use uuid::Uuid;

use codescribe_shared::{Tier, Trial, TrialSource, TrialStatus};

use crate::error::{EntitlementError, EntitlementResult};

/// Tunables for trial granting
#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Days after a previous trial ends before a user is eligible again
    pub cooldown_days: i64,
    /// Duration applied when a grant does not specify one
    pub default_duration_days: i64,
    /// Upper bound for a single extension
    pub max_extension_days: i64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            cooldown_days: 90,
            default_duration_days: 14,
            max_extension_days: 60,
        }
    }
}

/// Structured eligibility outcome; failures carry a reason, they are not
/// errors
#[derive(Debug, Clone, serde::Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Eligibility {
    fn ok() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Parameters for granting a trial
#[derive(Debug, Clone)]
pub struct GrantTrialParams {
    pub user_id: Uuid,
    pub trial_tier: Tier,
    pub duration_days: i64,
    pub source: TrialSource,
    pub granted_by: Option<Uuid>,
    pub invite_code_id: Option<Uuid>,
    pub trial_program_id: Option<Uuid>,
    /// Admin force-grant: bypasses the cooldown, never the one-active-trial
    /// rule
    pub force: bool,
}

/// Result of a grant attempt
#[derive(Debug)]
pub enum GrantOutcome {
    Granted(Trial),
    Ineligible(Eligibility),
}

/// Pure eligibility decision over a user's trial history
///
/// An active, unlapsed trial always rejects. Otherwise any prior trial whose
/// end falls inside the cooldown window rejects, unless force-granted.
pub fn evaluate_eligibility(
    history: &[Trial],
    now: OffsetDateTime,
    cooldown_days: i64,
    force: bool,
) -> Eligibility {
    if history.iter().any(|t| t.is_active_at(now)) {
        return Eligibility::rejected("already has an active trial");
    }

    if force {
        return Eligibility::ok();
    }

    let cooldown_start = now - Duration::days(cooldown_days);
    if history.iter().any(|t| t.ends_at > cooldown_start) {
        return Eligibility::rejected(format!(
            "already used a trial within the last {} days",
            cooldown_days
        ));
    }

    Eligibility::ok()
}

/// Pure form of the guarded expiry write: only an active trial moves to
/// expired, anything else stays put
pub fn apply_expiry(status: TrialStatus) -> TrialStatus {
    match status {
        TrialStatus::Active => TrialStatus::Expired,
        other => other,
    }
}

/// Trial store and lifecycle operations
#[derive(Clone)]
pub struct TrialService {
    pool: PgPool,
    config: TrialConfig,
}

impl TrialService {
    pub fn new(pool: PgPool, config: TrialConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    /// Find the trial currently conferring a tier, if any
    ///
    /// A trial past its end is excluded immediately; its status flip is
    /// dispatched in the background and never blocks this read.
    pub async fn find_active(&self, user_id: Uuid) -> EntitlementResult<Option<Trial>> {
        let trial: Option<Trial> =
            sqlx::query_as("SELECT * FROM trials WHERE user_id = $1 AND status = 'active' LIMIT 1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(trial) = trial else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc();
        if trial.is_expiry_due(now) {
            tracing::debug!(trial_id = %trial.id, user_id = %user_id, "Trial lapsed, dispatching expiry write");
            // Fire-and-forget; the receiver is only awaited by tests
            let _ = self.dispatch_expiry(trial.id);
            return Ok(None);
        }

        Ok(Some(trial))
    }

    /// Dispatch the expiry write for a lapsed trial as a background task
    ///
    /// The outcome (including failure) is delivered on the returned channel;
    /// failures are also logged. Errors are never retried: expiry is
    /// re-detected on every read, so the write is eventually applied.
    pub fn dispatch_expiry(&self, trial_id: Uuid) -> oneshot::Receiver<EntitlementResult<bool>> {
        let (tx, rx) = oneshot::channel();
        let service = self.clone();

        tokio::spawn(async move {
            let result = service.expire(trial_id).await;
            if let Err(ref e) = result {
                tracing::error!(trial_id = %trial_id, error = %e, "Trial expiry write failed");
            }
            // Receiver may have been dropped; that is the normal case
            let _ = tx.send(result);
        });

        rx
    }

    /// Persist expiry for a lapsed trial
    ///
    /// Guarded so it is idempotent: returns false when the trial was already
    /// expired (or otherwise terminal), true when this call flipped it.
    pub async fn expire(&self, trial_id: Uuid) -> EntitlementResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE trials
            SET status = 'expired',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND ends_at <= NOW()
            "#,
        )
        .bind(trial_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Check whether the user may receive a (non-forced) trial
    pub async fn check_eligibility(&self, user_id: Uuid) -> EntitlementResult<Eligibility> {
        let history = self.history(user_id).await?;
        Ok(evaluate_eligibility(
            &history,
            OffsetDateTime::now_utc(),
            self.config.cooldown_days,
            false,
        ))
    }

    /// Grant a trial
    ///
    /// Ineligible users get a structured rejection, not an error; no row is
    /// created in that case.
    pub async fn grant(&self, params: GrantTrialParams) -> EntitlementResult<GrantOutcome> {
        if !params.trial_tier.is_paid() {
            return Err(EntitlementError::Validation(
                "Trial tier must be a paid tier".to_string(),
            ));
        }
        if params.duration_days < 1 || params.duration_days > 365 {
            return Err(EntitlementError::Validation(
                "Trial duration must be between 1 and 365 days".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let history = self.history(params.user_id).await?;

        // Flip any lapsed-but-unwritten trial first so the partial unique
        // index cannot reject the insert below
        for lapsed in history.iter().filter(|t| t.is_expiry_due(now)) {
            self.expire(lapsed.id).await?;
        }

        let eligibility =
            evaluate_eligibility(&history, now, self.config.cooldown_days, params.force);
        if !eligibility.eligible {
            return Ok(GrantOutcome::Ineligible(eligibility));
        }

        let insert_result: Result<Trial, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO trials (
                user_id, trial_tier, starts_at, ends_at, status, source,
                granted_by, invite_code_id, trial_program_id
            )
            VALUES ($1, $2, NOW(), NOW() + make_interval(days => $3), 'active', $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.trial_tier)
        .bind(params.duration_days as i32)
        .bind(params.source)
        .bind(params.granted_by)
        .bind(params.invite_code_id)
        .bind(params.trial_program_id)
        .fetch_one(&self.pool)
        .await;

        match insert_result {
            Ok(trial) => {
                tracing::info!(
                    trial_id = %trial.id,
                    user_id = %params.user_id,
                    tier = %params.trial_tier,
                    source = %params.source,
                    duration_days = params.duration_days,
                    "Trial granted"
                );
                Ok(GrantOutcome::Granted(trial))
            }
            Err(e) => {
                // Two concurrent grants can both pass the eligibility read;
                // the partial unique index settles the race
                let active_conflict = e
                    .as_database_error()
                    .and_then(|db| db.constraint())
                    .map(|c| c == "trials_one_active_per_user")
                    .unwrap_or(false);

                if active_conflict {
                    Ok(GrantOutcome::Ineligible(Eligibility::rejected(
                        "already has an active trial",
                    )))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Add days to an active trial
    pub async fn extend(&self, trial_id: Uuid, days: i64) -> EntitlementResult<Trial> {
        if days < 1 || days > self.config.max_extension_days {
            return Err(EntitlementError::Validation(format!(
                "Extension must be between 1 and {} days",
                self.config.max_extension_days
            )));
        }

        let trial: Option<Trial> = sqlx::query_as(
            r#"
            UPDATE trials
            SET ends_at = ends_at + make_interval(days => $2),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(trial_id)
        .bind(days as i32)
        .fetch_optional(&self.pool)
        .await?;

        trial.ok_or(EntitlementError::TrialNotActive)
    }

    /// Admin-initiated early termination of an active trial
    pub async fn cancel(&self, trial_id: Uuid) -> EntitlementResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE trials
            SET status = 'cancelled',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
            "#,
        )
        .bind(trial_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    /// All trials for a user, newest first
    pub async fn history(&self, user_id: Uuid) -> EntitlementResult<Vec<Trial>> {
        let trials: Vec<Trial> =
            sqlx::query_as("SELECT * FROM trials WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(trials)
    }
}
