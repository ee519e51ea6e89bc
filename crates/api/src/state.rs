//! Application state

use sqlx::PgPool;

use codescribe_entitlements::{ProgramService, TrialConfig, TrialService};
use codescribe_shared::{ActionRateLimiter, RateLimitConfig};

use crate::{
    auth::{AuthState, JwtManager, TokenManager},
    config::Config,
    docgen::DocGenClient,
    email::EmailService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub token_manager: TokenManager,
    pub email: EmailService,
    /// Documentation generation client (None when DOCGEN_API_KEY is unset)
    pub docgen: Option<DocGenClient>,
    pub trials: TrialService,
    pub programs: ProgramService,
    /// Per-email limiter for password reset sends
    pub password_reset_limiter: ActionRateLimiter,
    /// Per-email limiter for verification email sends
    pub email_verify_limiter: ActionRateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let token_manager = TokenManager::new(pool.clone());

        let email = EmailService::from_env();
        if email.is_enabled() {
            tracing::info!("Email notifications enabled");
        } else {
            tracing::warn!("Email notifications not configured (missing RESEND_API_KEY)");
        }

        let docgen = DocGenClient::from_env();
        if docgen.is_some() {
            tracing::info!("Documentation generation client initialized");
        } else {
            tracing::warn!("Documentation generation not configured (missing DOCGEN_API_KEY)");
        }

        let trials = TrialService::new(
            pool.clone(),
            TrialConfig {
                cooldown_days: config.trial_cooldown_days,
                default_duration_days: config.trial_default_duration_days,
                ..TrialConfig::default()
            },
        );
        let programs = ProgramService::new(pool.clone(), trials.clone());

        let password_reset_limiter =
            ActionRateLimiter::new_in_memory(RateLimitConfig::password_reset());
        let email_verify_limiter =
            ActionRateLimiter::new_in_memory(RateLimitConfig::email_verification());
        tracing::info!("Action rate limiters initialized (in-memory, single instance)");

        Self {
            pool,
            config,
            jwt_manager,
            token_manager,
            email,
            docgen,
            trials,
            programs,
            password_reset_limiter,
            email_verify_limiter,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
            trials: self.trials.clone(),
        }
    }
}
