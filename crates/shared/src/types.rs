//! Common types used across CodeScribe

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for feature gating and billing
///
/// `Starter` is a legacy tier kept for parsing compatibility with old user
/// rows; it carries free-equivalent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
    Team,
    Enterprise,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Free
    }
}

impl Tier {
    /// Whether this is a paid tier (anything above Free/Starter)
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Pro | Self::Team | Self::Enterprise)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

/// Platform-wide role of a user account
///
/// Distinct from billing: staff roles (support and up) may view the product
/// as another tier via a time-boxed override without touching the billed
/// tier. Support is read-only in the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    User,
    Support,
    Admin,
    SuperAdmin,
}

impl Default for PlatformRole {
    fn default() -> Self {
        Self::User
    }
}

impl PlatformRole {
    /// Staff roles are eligible for tier overrides
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Support | Self::Admin | Self::SuperAdmin)
    }

    /// Whether this role may perform admin API writes
    pub fn can_admin_write(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    /// Whether this role may read the admin API
    pub fn can_admin_read(&self) -> bool {
        self.is_staff()
    }

    /// Parse a role from string (case insensitive), defaulting to User
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "support" => Self::Support,
            "admin" => Self::Admin,
            "super_admin" | "superadmin" => Self::SuperAdmin,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Support => write!(f, "support"),
            Self::Admin => write!(f, "admin"),
            Self::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

/// Trial lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Active,
    Expired,
    Converted,
    Cancelled,
}

impl TrialStatus {
    /// Terminal states cannot transition further
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Converted => write!(f, "converted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TrialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "converted" => Ok(Self::Converted),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid trial status: {}", s)),
        }
    }
}

/// How a trial was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrialSource {
    Invite,
    AdminGrant,
    AutoCampaign,
    SelfServe,
}

impl std::fmt::Display for TrialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invite => write!(f, "invite"),
            Self::AdminGrant => write!(f, "admin_grant"),
            Self::AutoCampaign => write!(f, "auto_campaign"),
            Self::SelfServe => write!(f, "self_serve"),
        }
    }
}

/// Documentation job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Completed,
    Failed,
}

impl Default for DocumentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Batch job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Open,
    Processing,
    Completed,
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::Open
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User account model
///
/// `tier` is the billed tier and is never mutated by overrides or trials.
/// The `viewing_as_tier` / `override_*` columns hold the time-boxed staff
/// override consulted by the effective-tier resolver.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub tier: Tier,
    pub platform_role: PlatformRole,
    pub viewing_as_tier: Option<Tier>,
    pub override_expires_at: Option<OffsetDateTime>,
    pub override_reason: Option<String>,
    pub override_applied_at: Option<OffsetDateTime>,
    pub override_applied_by: Option<Uuid>,
    pub email_verified: bool,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Trial model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trial {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Tier granted by the trial; resolver defaults to Pro when absent
    pub trial_tier: Option<Tier>,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub status: TrialStatus,
    pub source: TrialSource,
    pub granted_by: Option<Uuid>,
    pub invite_code_id: Option<Uuid>,
    pub trial_program_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Trial {
    /// Whether this trial confers its tier at `now`
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.status == TrialStatus::Active && now < self.ends_at
    }

    /// Active status but past its end: due for the lazy expiry write
    pub fn is_expiry_due(&self, now: OffsetDateTime) -> bool {
        self.status == TrialStatus::Active && now >= self.ends_at
    }
}

/// Invite code issuance record (bookkeeping only)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InviteCode {
    pub id: Uuid,
    pub code: String,
    pub trial_tier: Tier,
    pub duration_days: i32,
    pub max_uses: i32,
    pub use_count: i32,
    pub expires_at: Option<OffsetDateTime>,
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl InviteCode {
    pub fn is_redeemable_at(&self, now: OffsetDateTime) -> bool {
        self.use_count < self.max_uses && self.expires_at.map(|e| now < e).unwrap_or(true)
    }
}

/// Auto-campaign trial program: while active, new registrations receive a
/// trial of `trial_tier` for `duration_days`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrialProgram {
    pub id: Uuid,
    pub name: String,
    pub trial_tier: Tier,
    pub duration_days: i32,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// Generated documentation record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub title: String,
    pub language: String,
    pub doc_type: String,
    pub source_size_bytes: i32,
    pub status: DocumentStatus,
    pub output: Option<String>,
    pub tokens_used: Option<i32>,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Batch of documentation jobs
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Batch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: BatchStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// API Response Types
// =============================================================================

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            data,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_tier_default() {
        assert_eq!(Tier::default(), Tier::Free);
    }

    #[test]
    fn test_tier_is_paid() {
        assert!(!Tier::Free.is_paid());
        assert!(!Tier::Starter.is_paid()); // Legacy
        assert!(Tier::Pro.is_paid());
        assert!(Tier::Team.is_paid());
        assert!(Tier::Enterprise.is_paid());
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(format!("{}", Tier::Free), "free");
        assert_eq!(format!("{}", Tier::Starter), "starter");
        assert_eq!(format!("{}", Tier::Pro), "pro");
        assert_eq!(format!("{}", Tier::Team), "team");
        assert_eq!(format!("{}", Tier::Enterprise), "enterprise");
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("free".parse::<Tier>().unwrap(), Tier::Free);
        assert_eq!("FREE".parse::<Tier>().unwrap(), Tier::Free);
        assert_eq!("Pro".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!("TEAM".parse::<Tier>().unwrap(), Tier::Team);
        assert!("invalid".parse::<Tier>().is_err());
    }

    #[test]
    fn test_platform_role_staff() {
        assert!(!PlatformRole::User.is_staff());
        assert!(PlatformRole::Support.is_staff());
        assert!(PlatformRole::Admin.is_staff());
        assert!(PlatformRole::SuperAdmin.is_staff());
    }

    #[test]
    fn test_platform_role_admin_access() {
        // Writes: admin and above
        assert!(!PlatformRole::User.can_admin_write());
        assert!(!PlatformRole::Support.can_admin_write());
        assert!(PlatformRole::Admin.can_admin_write());
        assert!(PlatformRole::SuperAdmin.can_admin_write());

        // Reads: any staff role
        assert!(!PlatformRole::User.can_admin_read());
        assert!(PlatformRole::Support.can_admin_read());
    }

    #[test]
    fn test_platform_role_from_str_lossy() {
        assert_eq!(PlatformRole::from_str_lossy("admin"), PlatformRole::Admin);
        assert_eq!(
            PlatformRole::from_str_lossy("SUPER_ADMIN"),
            PlatformRole::SuperAdmin
        );
        assert_eq!(PlatformRole::from_str_lossy("unknown"), PlatformRole::User); // Default
    }

    #[test]
    fn test_trial_status_terminal() {
        assert!(!TrialStatus::Active.is_terminal());
        assert!(TrialStatus::Expired.is_terminal());
        assert!(TrialStatus::Converted.is_terminal());
        assert!(TrialStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_trial_status_display_and_parse() {
        assert_eq!(format!("{}", TrialStatus::Active), "active");
        assert_eq!(
            "cancelled".parse::<TrialStatus>().unwrap(),
            TrialStatus::Cancelled
        );
        assert!("invalid".parse::<TrialStatus>().is_err());
    }

    fn make_trial(status: TrialStatus, ends_in: Duration) -> Trial {
        let now = OffsetDateTime::now_utc();
        Trial {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trial_tier: Some(Tier::Pro),
            starts_at: now - Duration::days(1),
            ends_at: now + ends_in,
            status,
            source: TrialSource::SelfServe,
            granted_by: None,
            invite_code_id: None,
            trial_program_id: None,
            created_at: now - Duration::days(1),
            updated_at: now - Duration::days(1),
        }
    }

    #[test]
    fn test_trial_activity_windows() {
        let now = OffsetDateTime::now_utc();

        let live = make_trial(TrialStatus::Active, Duration::days(3));
        assert!(live.is_active_at(now));
        assert!(!live.is_expiry_due(now));

        let lapsed = make_trial(TrialStatus::Active, Duration::days(-1));
        assert!(!lapsed.is_active_at(now));
        assert!(lapsed.is_expiry_due(now));

        // Terminal states never confer the tier and never need the expiry write
        let cancelled = make_trial(TrialStatus::Cancelled, Duration::days(3));
        assert!(!cancelled.is_active_at(now));
        assert!(!cancelled.is_expiry_due(now));
    }

    #[test]
    fn test_invite_code_redeemable() {
        let now = OffsetDateTime::now_utc();
        let code = InviteCode {
            id: Uuid::new_v4(),
            code: "LAUNCH25".to_string(),
            trial_tier: Tier::Pro,
            duration_days: 14,
            max_uses: 2,
            use_count: 1,
            expires_at: Some(now + Duration::days(7)),
            created_by: None,
            created_at: now,
        };
        assert!(code.is_redeemable_at(now));

        let exhausted = InviteCode {
            use_count: 2,
            ..code.clone()
        };
        assert!(!exhausted.is_redeemable_at(now));

        let expired = InviteCode {
            expires_at: Some(now - Duration::hours(1)),
            ..code
        };
        assert!(!expired.is_redeemable_at(now));
    }

    #[test]
    fn test_paginated_response() {
        let data = vec![1, 2, 3, 4, 5];
        let response = PaginatedResponse::new(data, 100, 1, 10);

        assert_eq!(response.total, 100);
        assert_eq!(response.total_pages, 10);
    }

    #[test]
    fn test_paginated_response_partial_page() {
        let data = vec![1, 2, 3];
        let response = PaginatedResponse::new(data, 23, 3, 10);

        // 23 items / 10 per page = 3 pages (2 full + 1 partial)
        assert_eq!(response.total_pages, 3);
    }
}
