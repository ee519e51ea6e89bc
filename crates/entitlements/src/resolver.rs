//! Effective tier resolution
//!
//! The tier a request is served at is derived, never stored: staff overrides
//! and trials expire by wall clock, so caching a resolution would serve stale
//! entitlements. Resolution is a pure function of the user row, the active
//! trial (if any), and the clock.
//!
//! Precedence, first match wins:
//! 1. staff role + `viewing_as_tier` + unexpired `override_expires_at`
//! 2. billed tier, when not free
//! 3. active trial tier (pro when the row carries none)
//! 4. billed tier (free when unset)
//!
//! Neither override nor trial ever mutates `users.tier`.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_shared::{PlatformRole, Tier, Trial, TrialStatus, User};

/// Which input won the resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierSource {
    /// Staff tier override
    Override,
    /// Paid billed tier
    Billed,
    /// Active trial
    Trial,
    /// Nothing applied; free
    Default,
}

/// The resolved view of a user for one request
///
/// Built by [`build_effective_user`]; explicit named fields, no dynamic
/// merging of user and override records.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveUser {
    pub user_id: Uuid,
    pub email: String,
    pub platform_role: PlatformRole,
    /// Billed tier, untouched by overrides and trials
    pub billed_tier: Tier,
    pub effective_tier: Tier,
    pub tier_source: TierSource,
    pub trial: Option<TrialSummary>,
}

/// Trial fields exposed on the effective view
#[derive(Debug, Clone, Serialize)]
pub struct TrialSummary {
    pub id: Uuid,
    pub tier: Tier,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub status: TrialStatus,
}

/// Resolve the tier used for feature-gating this request
pub fn resolve_effective_tier(user: &User, trial: Option<&Trial>, now: OffsetDateTime) -> Tier {
    resolve(user, trial, now).0
}

/// Build the full effective view of a user
pub fn build_effective_user(
    user: &User,
    trial: Option<&Trial>,
    now: OffsetDateTime,
) -> EffectiveUser {
    let (effective_tier, tier_source) = resolve(user, trial, now);

    EffectiveUser {
        user_id: user.id,
        email: user.email.clone(),
        platform_role: user.platform_role,
        billed_tier: user.tier,
        effective_tier,
        tier_source,
        trial: trial.filter(|t| t.is_active_at(now)).map(|t| TrialSummary {
            id: t.id,
            tier: t.trial_tier.unwrap_or(Tier::Pro),
            ends_at: t.ends_at,
            status: t.status,
        }),
    }
}

fn resolve(user: &User, trial: Option<&Trial>, now: OffsetDateTime) -> (Tier, TierSource) {
    // 1. Role-gated, time-boxed staff override
    if user.platform_role.is_staff() {
        if let (Some(viewing_as), Some(expires_at)) =
            (user.viewing_as_tier, user.override_expires_at)
        {
            if now < expires_at {
                return (viewing_as, TierSource::Override);
            }
        }
    }

    // 2. Paid billed tier
    if user.tier != Tier::Free {
        return (user.tier, TierSource::Billed);
    }

    // 3. Active trial
    if let Some(trial) = trial {
        if trial.is_active_at(now) {
            return (trial.trial_tier.unwrap_or(Tier::Pro), TierSource::Trial);
        }
    }

    // 4. Nothing applies
    (user.tier, TierSource::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescribe_shared::TrialSource;
    use time::Duration;

    fn base_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "dev@example.com".to_string(),
            password_hash: "HASH".to_string(),
            tier: Tier::Free,
            platform_role: PlatformRole::User,
            viewing_as_tier: None,
            override_expires_at: None,
            override_reason: None,
            override_applied_at: None,
            override_applied_by: None,
            email_verified: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn trial_ending_in(ends_in: Duration, tier: Option<Tier>) -> Trial {
        let now = OffsetDateTime::now_utc();
        Trial {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trial_tier: tier,
            starts_at: now - Duration::days(1),
            ends_at: now + ends_in,
            status: TrialStatus::Active,
            source: TrialSource::SelfServe,
            granted_by: None,
            invite_code_id: None,
            trial_program_id: None,
            created_at: now - Duration::days(1),
            updated_at: now - Duration::days(1),
        }
    }

    #[test]
    fn test_non_staff_override_fields_ignored() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            tier: Tier::Starter,
            viewing_as_tier: Some(Tier::Enterprise),
            override_expires_at: Some(now + Duration::hours(1)),
            ..base_user()
        };

        // Role is user, so the override fields must not apply
        assert_eq!(resolve_effective_tier(&user, None, now), Tier::Starter);
    }

    #[test]
    fn test_valid_override_wins_over_active_trial() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            tier: Tier::Free,
            platform_role: PlatformRole::Support,
            viewing_as_tier: Some(Tier::Team),
            override_expires_at: Some(now + Duration::minutes(30)),
            ..base_user()
        };
        let trial = trial_ending_in(Duration::days(5), Some(Tier::Pro));

        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Team);
    }

    #[test]
    fn test_free_user_with_future_trial_gets_trial_tier() {
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::days(1), Some(Tier::Pro));

        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Pro);
    }

    #[test]
    fn test_free_user_with_lapsed_trial_is_free() {
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::hours(-2), Some(Tier::Pro));

        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Free);
    }

    #[test]
    fn test_scenario_free_user_trial_ends_tomorrow() {
        // user{tier: free, role: user}, trial{tier: pro, ends_at: tomorrow} -> pro
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::days(1), Some(Tier::Pro));

        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Pro);
    }

    #[test]
    fn test_scenario_admin_with_live_override() {
        // user{tier: starter, role: admin, viewing_as: enterprise,
        //      override_expires_at: +1h} -> enterprise
        let now = OffsetDateTime::now_utc();
        let user = User {
            tier: Tier::Starter,
            platform_role: PlatformRole::Admin,
            viewing_as_tier: Some(Tier::Enterprise),
            override_expires_at: Some(now + Duration::hours(1)),
            ..base_user()
        };

        assert_eq!(resolve_effective_tier(&user, None, now), Tier::Enterprise);
    }

    #[test]
    fn test_scenario_admin_with_lapsed_override() {
        // Same as above but override expired an hour ago -> billed starter
        let now = OffsetDateTime::now_utc();
        let user = User {
            tier: Tier::Starter,
            platform_role: PlatformRole::Admin,
            viewing_as_tier: Some(Tier::Enterprise),
            override_expires_at: Some(now - Duration::hours(1)),
            ..base_user()
        };

        assert_eq!(resolve_effective_tier(&user, None, now), Tier::Starter);
    }

    #[test]
    fn test_paid_tier_wins_over_trial() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            tier: Tier::Pro,
            ..base_user()
        };
        let trial = trial_ending_in(Duration::days(3), Some(Tier::Team));

        // Billed pro outranks the team trial
        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Pro);
    }

    #[test]
    fn test_trial_tier_defaults_to_pro() {
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::days(3), None);

        assert_eq!(resolve_effective_tier(&user, Some(&trial), now), Tier::Pro);
    }

    #[test]
    fn test_override_without_expiry_is_inert() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            platform_role: PlatformRole::Admin,
            viewing_as_tier: Some(Tier::Enterprise),
            override_expires_at: None,
            ..base_user()
        };

        assert_eq!(resolve_effective_tier(&user, None, now), Tier::Free);
    }

    #[test]
    fn test_effective_user_reports_source_and_keeps_billed_tier() {
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::days(2), Some(Tier::Pro));

        let effective = build_effective_user(&user, Some(&trial), now);

        assert_eq!(effective.effective_tier, Tier::Pro);
        assert_eq!(effective.tier_source, TierSource::Trial);
        // Billing integrity: the billed tier is reported unchanged
        assert_eq!(effective.billed_tier, Tier::Free);
        assert!(effective.trial.is_some());
    }

    #[test]
    fn test_effective_user_excludes_lapsed_trial_summary() {
        let now = OffsetDateTime::now_utc();
        let user = base_user();
        let trial = trial_ending_in(Duration::hours(-1), Some(Tier::Pro));

        let effective = build_effective_user(&user, Some(&trial), now);

        assert_eq!(effective.effective_tier, Tier::Free);
        assert_eq!(effective.tier_source, TierSource::Default);
        assert!(effective.trial.is_none());
    }
}
