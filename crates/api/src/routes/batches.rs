//! Batch routes: grouped documentation jobs with per-status aggregation

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use codescribe_shared::{Batch, Feature, PaginatedResponse};

use crate::{auth::AuthUser, error::{ApiError, ApiResult}, state::AppState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListBatchesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BatchDetailResponse {
    pub batch: Batch,
    pub totals: BatchTotals,
}

/// Per-status aggregation of a batch's documents
#[derive(Debug, Serialize, FromRow)]
pub struct BatchTotals {
    pub total: i64,
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
    pub tokens_used: i64,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn create_batch(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateBatchRequest>,
) -> ApiResult<Json<Batch>> {
    auth_user.require_feature(Feature::BatchProcessing)?;

    let name = request.name.trim();
    if name.is_empty() || name.len() > 255 {
        return Err(ApiError::Validation(
            "Batch name must be between 1 and 255 characters".to_string(),
        ));
    }

    let batch: Batch = sqlx::query_as(
        r#"
        INSERT INTO batches (user_id, name)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(auth_user.user_id)
    .bind(name)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(batch_id = %batch.id, user_id = %auth_user.user_id, "Batch created");

    Ok(Json(batch))
}

pub async fn list_batches(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListBatchesQuery>,
) -> ApiResult<Json<PaginatedResponse<Batch>>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let batches: Vec<Batch> = sqlx::query_as(
        r#"
        SELECT * FROM batches
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auth_user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches WHERE user_id = $1")
        .bind(auth_user.user_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(PaginatedResponse::new(batches, total, page, limit)))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BatchDetailResponse>> {
    let batch: Option<Batch> =
        sqlx::query_as("SELECT * FROM batches WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(auth_user.user_id)
            .fetch_optional(&state.pool)
            .await?;

    let Some(batch) = batch else {
        return Err(ApiError::NotFound);
    };

    let totals: BatchTotals = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'completed') AS completed,
            COUNT(*) FILTER (WHERE status = 'failed') AS failed,
            COALESCE(SUM(tokens_used), 0)::BIGINT AS tokens_used
        FROM documents
        WHERE batch_id = $1
        "#,
    )
    .bind(batch.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(BatchDetailResponse { batch, totals }))
}
