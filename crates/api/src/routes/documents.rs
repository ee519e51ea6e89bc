//! Documentation generation routes

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use codescribe_shared::{Batch, BatchStatus, Document, DocumentStatus, Feature, PaginatedResponse};

use crate::{auth::AuthUser, error::{ApiError, ApiResult}, state::AppState};

const ALLOWED_DOC_TYPES: &[&str] = &["reference", "docstrings", "readme"];

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub language: String,
    pub doc_type: Option<String>,
    pub source_code: String,
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub batch_id: Option<Uuid>,
}

/// List view without the generated body
#[derive(Debug, Serialize, FromRow)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub batch_id: Option<Uuid>,
    pub title: String,
    pub language: String,
    pub doc_type: String,
    pub status: DocumentStatus,
    pub tokens_used: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn create_document(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateDocumentRequest>,
) -> ApiResult<Json<Document>> {
    let title = request.title.trim();
    if title.is_empty() || title.len() > 255 {
        return Err(ApiError::Validation(
            "Title must be between 1 and 255 characters".to_string(),
        ));
    }

    let language = request.language.trim().to_lowercase();
    if language.is_empty() || language.len() > 50 {
        return Err(ApiError::Validation("Language is required".to_string()));
    }

    let doc_type = request
        .doc_type
        .as_deref()
        .unwrap_or("reference")
        .to_lowercase();
    if !ALLOWED_DOC_TYPES.contains(&doc_type.as_str()) {
        return Err(ApiError::Validation(format!(
            "doc_type must be one of: {}",
            ALLOWED_DOC_TYPES.join(", ")
        )));
    }

    if request.source_code.trim().is_empty() {
        return Err(ApiError::Validation("Source code is required".to_string()));
    }

    let features = auth_user.features();

    // Size limit is per effective tier
    let source_size_bytes = request.source_code.len();
    let max_bytes = (features.max_source_kb as u64).saturating_mul(1024);
    if source_size_bytes as u64 > max_bytes {
        return Err(ApiError::Validation(format!(
            "Source exceeds the {} KB limit for the {} tier",
            features.max_source_kb, auth_user.effective_tier
        )));
    }

    // Monthly quota is per effective tier, counted per calendar month
    let used_this_month: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM documents
        WHERE user_id = $1
          AND created_at >= date_trunc('month', NOW())
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_one(&state.pool)
    .await?;

    if (used_this_month as u64) >= features.monthly_generations {
        return Err(ApiError::QuotaExceeded(format!(
            "Monthly generation quota ({}) reached for the {} tier",
            features.monthly_generations, auth_user.effective_tier
        )));
    }

    // Batch membership checks
    if let Some(batch_id) = request.batch_id {
        auth_user.require_feature(Feature::BatchProcessing)?;

        let batch: Option<Batch> =
            sqlx::query_as("SELECT * FROM batches WHERE id = $1 AND user_id = $2")
                .bind(batch_id)
                .bind(auth_user.user_id)
                .fetch_optional(&state.pool)
                .await?;

        let Some(batch) = batch else {
            return Err(ApiError::NotFound);
        };
        if batch.status != BatchStatus::Open {
            return Err(ApiError::Validation(
                "Batch is no longer accepting documents".to_string(),
            ));
        }

        let batch_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_one(&state.pool)
                .await?;
        if (batch_count as u32) >= features.max_batch_files {
            return Err(ApiError::Validation(format!(
                "Batch is full ({} files max on the {} tier)",
                features.max_batch_files, auth_user.effective_tier
            )));
        }
    }

    let Some(docgen) = state.docgen.as_ref() else {
        return Err(ApiError::ServiceUnavailable(
            "Documentation generation is temporarily unavailable".to_string(),
        ));
    };

    let document: Document = sqlx::query_as(
        r#"
        INSERT INTO documents (user_id, batch_id, title, language, doc_type, source_size_bytes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(auth_user.user_id)
    .bind(request.batch_id)
    .bind(title)
    .bind(&language)
    .bind(&doc_type)
    .bind(source_size_bytes as i32)
    .fetch_one(&state.pool)
    .await?;

    // Generate synchronously; a failed generation is recorded on the row,
    // not surfaced as an HTTP error
    let document = match docgen
        .generate(&language, &doc_type, &request.source_code)
        .await
    {
        Ok(generation) => {
            sqlx::query_as(
                r#"
                UPDATE documents
                SET status = 'completed',
                    output = $2,
                    tokens_used = $3,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(document.id)
            .bind(&generation.text)
            .bind(generation.tokens_used)
            .fetch_one(&state.pool)
            .await?
        }
        Err(e) => {
            tracing::error!(document_id = %document.id, error = %e, "Documentation generation failed");
            sqlx::query_as(
                r#"
                UPDATE documents
                SET status = 'failed',
                    error = $2,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(document.id)
            .bind(e.to_string())
            .fetch_one(&state.pool)
            .await?
        }
    };

    tracing::info!(
        document_id = %document.id,
        user_id = %auth_user.user_id,
        status = ?document.status,
        "Document processed"
    );

    Ok(Json(document))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<PaginatedResponse<DocumentSummary>>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let documents: Vec<DocumentSummary> = sqlx::query_as(
        r#"
        SELECT id, batch_id, title, language, doc_type, status, tokens_used, created_at
        FROM documents
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR batch_id = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(auth_user.user_id)
    .bind(query.batch_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM documents
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR batch_id = $2)
        "#,
    )
    .bind(auth_user.user_id)
    .bind(query.batch_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(PaginatedResponse::new(documents, total, page, limit)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Document>> {
    let document: Option<Document> =
        sqlx::query_as("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(auth_user.user_id)
            .fetch_optional(&state.pool)
            .await?;

    document.map(Json).ok_or(ApiError::NotFound)
}

pub async fn delete_document(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows_affected = sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth_user.user_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(Json(json!({ "deleted": true })))
}
