//! Unit tests for authentication building blocks
//!
//! Tests cover:
//! - JWT issue/validate round trips, tampered and cross-secret tokens
//! - Effective-tier data carried on AuthUser
//! - Feature gating against the effective tier

#[cfg(test)]
#[allow(dead_code)]
mod tests {
    use super::super::jwt::JwtManager;
    use super::super::middleware::AuthUser;
    use codescribe_entitlements::TierSource;
    use codescribe_shared::{Feature, PlatformRole, Tier};
    use uuid::Uuid;

    fn auth_user(effective_tier: Tier) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            platform_role: PlatformRole::User,
            billed_tier: Tier::Free,
            effective_tier,
            tier_source: TierSource::Trial,
            trial: None,
        }
    }

    #[test]
    fn test_jwt_generate_and_validate() {
        let jwt_manager = JwtManager::new("test-secret-key-for-jwt", 24);
        let user_id = Uuid::new_v4();

        let (token, jti) = jwt_manager
            .generate_access_token(user_id, "test@example.com", "user")
            .expect("Failed to generate JWT");

        let claims = jwt_manager
            .validate_access_token(&token)
            .expect("Failed to validate JWT");

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.jti, jti);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_jwt_validate_invalid_token() {
        let jwt_manager = JwtManager::new("test-secret-key", 24);
        let result = jwt_manager.validate_access_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_jwt_validate_wrong_secret() {
        let jwt_manager1 = JwtManager::new("secret1-secret1-secret1", 24);
        let jwt_manager2 = JwtManager::new("secret2-secret2-secret2", 24);

        let (token, _jti) = jwt_manager1
            .generate_access_token(Uuid::new_v4(), "test@example.com", "user")
            .expect("Failed to generate token");

        let result = jwt_manager2.validate_access_token(&token);
        assert!(result.is_err());
    }

    #[test]
    fn test_jwt_expiry_seconds() {
        let jwt_manager = JwtManager::new("test-secret-key", 24);
        assert_eq!(jwt_manager.expiry_seconds(), 24 * 3600);
    }

    #[test]
    fn test_auth_user_features_follow_effective_tier() {
        // Billed free, effective pro (e.g. via trial): pro limits apply
        let user = auth_user(Tier::Pro);
        assert_eq!(user.features().monthly_generations, 200);
        assert!(user.require_feature(Feature::BatchProcessing).is_ok());
    }

    #[test]
    fn test_auth_user_feature_gate_rejects_with_tier_name() {
        let user = auth_user(Tier::Free);
        let err = user
            .require_feature(Feature::BatchProcessing)
            .expect_err("free tier must not have batch processing");

        let message = format!("{}", err);
        assert!(message.contains("batch_processing"));
        assert!(message.contains("free"));
    }
}
