//! HTTP route registration

pub mod admin;
pub mod auth;
pub mod batches;
pub mod documents;
pub mod trials;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{auth::require_auth, state::AppState};

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route(
            "/api/v1/auth/password-reset/request",
            post(auth::request_password_reset),
        )
        .route(
            "/api/v1/auth/password-reset/confirm",
            post(auth::confirm_password_reset),
        )
        .route("/api/v1/auth/verify-email/confirm", post(auth::confirm_email));

    let protected = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route(
            "/api/v1/auth/verify-email/request",
            post(auth::request_email_verification),
        )
        .route("/api/v1/trials/current", get(trials::current_trial))
        .route("/api/v1/trials/start", post(trials::start_trial))
        .route("/api/v1/trials/redeem", post(trials::redeem_invite))
        .route(
            "/api/v1/documents",
            post(documents::create_document).get(documents::list_documents),
        )
        .route(
            "/api/v1/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route(
            "/api/v1/batches",
            post(batches::create_batch).get(batches::list_batches),
        )
        .route("/api/v1/batches/{id}", get(batches::get_batch))
        .route("/api/v1/admin/users", get(admin::list_users))
        .route("/api/v1/admin/users/{id}", get(admin::get_user))
        .route(
            "/api/v1/admin/users/{id}/override",
            post(admin::set_tier_override).delete(admin::clear_tier_override),
        )
        .route("/api/v1/admin/users/{id}/trial", post(admin::grant_trial))
        .route("/api/v1/admin/trials/{id}/extend", post(admin::extend_trial))
        .route("/api/v1/admin/trials/{id}/cancel", post(admin::cancel_trial))
        .route(
            "/api/v1/admin/invite-codes",
            post(admin::create_invite_code).get(admin::list_invite_codes),
        )
        .route("/api/v1/admin/stats", get(admin::get_stats))
        .route("/api/v1/admin/invariants", get(admin::run_invariants))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    public.merge(protected).with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
