//! Entitlement error types

/// Errors from entitlement operations
///
/// Eligibility failures are NOT errors: they come back as structured
/// [`crate::trials::Eligibility`] values so callers can surface the reason.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Trial not found or not active")]
    TrialNotActive,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;
