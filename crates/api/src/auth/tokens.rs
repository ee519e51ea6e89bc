//! Email verification and password reset tokens
//!
//! Raw tokens leave the process only inside outbound email; the database
//! stores a sha256 digest, so a leaked table cannot be replayed.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiResult;

/// What a verification token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerify,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerify => "email_verify",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// Hash a raw token for storage or lookup
pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Issues and consumes single-use verification tokens
#[derive(Clone)]
pub struct TokenManager {
    pool: PgPool,
}

impl TokenManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a token for the user and return the raw value
    ///
    /// Previous unused tokens for the same purpose are invalidated so only
    /// the latest emailed link works.
    pub async fn generate(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        ttl_hours: i64,
    ) -> ApiResult<String> {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let token_hash = hash_token(&raw);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE verification_tokens
            SET used_at = NOW()
            WHERE user_id = $1
              AND purpose = $2
              AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_tokens (user_id, token_hash, purpose, expires_at)
            VALUES ($1, $2, $3, NOW() + make_interval(hours => $4))
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(purpose.as_str())
        .bind(ttl_hours as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(raw)
    }

    /// Consume a raw token, returning the user it belonged to
    ///
    /// Returns None for unknown, expired, or already-used tokens.
    pub async fn consume(&self, raw: &str, purpose: TokenPurpose) -> ApiResult<Option<Uuid>> {
        let token_hash = hash_token(raw);

        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE verification_tokens
            SET used_at = NOW()
            WHERE token_hash = $1
              AND purpose = $2
              AND used_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(&token_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_deterministic_and_opaque() {
        let a = hash_token("raw-token-value");
        let b = hash_token("raw-token-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // sha256 hex
        assert_ne!(a, hash_token("other-token-value"));
        assert!(!a.contains("raw"));
    }
}
