//! Environment-driven configuration

use anyhow::Context;

/// API server configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Direct (non-pooler) URL for migrations; falls back to `database_url`
    pub database_direct_url: Option<String>,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Base URL used for links in outbound email
    pub app_base_url: String,
    pub trial_cooldown_days: i64,
    pub trial_default_duration_days: i64,
    /// Longest staff tier override, in hours
    pub max_override_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        Ok(Self {
            database_url,
            database_direct_url: std::env::var("DATABASE_DIRECT_URL").ok(),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret,
            jwt_expiry_hours: env_i64("JWT_EXPIRY_HOURS", 24)?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            trial_cooldown_days: env_i64("TRIAL_COOLDOWN_DAYS", 90)?,
            trial_default_duration_days: env_i64("TRIAL_DEFAULT_DURATION_DAYS", 14)?,
            max_override_hours: env_i64("MAX_OVERRIDE_HOURS", 72)?,
        })
    }
}

fn env_i64(name: &str, default: i64) -> anyhow::Result<i64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be an integer, got {:?}", name, value)),
        Err(_) => Ok(default),
    }
}
