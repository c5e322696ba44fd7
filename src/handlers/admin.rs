// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::auth::is_unique_violation,
    models::{
        question::{CreateQuestionRequest, QuizQuestion},
        topic::{CreateTopicRequest, Topic},
    },
    services::storage_quota::StorageQuotaAllocator,
    utils::jwt::Claims,
};

/// Creates a topic.
/// Admin only.
pub async fn create_topic(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let topic = sqlx::query_as::<_, Topic>(
        r#"
        INSERT INTO topics (name, content)
        VALUES ($1, $2)
        RETURNING id, name, content, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.content)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Topic '{}' already exists", payload.name))
        } else {
            tracing::error!("Failed to create topic: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(topic)))
}

/// Adds a question to the bank.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if let Some(stray) = payload
        .correct_answers
        .iter()
        .find(|answer| !payload.options.contains(answer))
    {
        return Err(AppError::BadRequest(format!(
            "Correct answer '{}' is not one of the options",
            stray
        )));
    }

    let question = sqlx::query_as::<_, QuizQuestion>(
        r#"
        INSERT INTO quiz_questions (
            topic, subtopic, question_type, question, options, correct_answers, explanation, source
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'manual')
        RETURNING id, topic, subtopic, question_type, question, options, correct_answers,
                  explanation, source, created_at
        "#,
    )
    .bind(&payload.topic)
    .bind(&payload.subtopic)
    .bind(&payload.question_type)
    .bind(&payload.question)
    .bind(SqlJson(payload.options.clone()))
    .bind(SqlJson(payload.correct_answers.clone()))
    .bind(&payload.explanation)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Question already exists".to_string())
        } else {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Current bucket rotation state.
/// Admin only.
pub async fn storage_status(
    State(allocator): State<Arc<StorageQuotaAllocator>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(allocator.status().await?))
}

/// Operator reset of the bucket rotation state.
/// Admin only.
pub async fn reset_storage(
    State(allocator): State<Arc<StorageQuotaAllocator>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    allocator.reset().await?;
    tracing::warn!(admin = %claims.sub, "Storage quota state reset");

    Ok(Json(allocator.status().await?))
}
