// src/handlers/topics.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::{
        quiz_attempt::QuizAttempt,
        topic::{PageParams, Topic, TopicPage},
    },
    utils::jwt::Claims,
};

/// Lists topics, newest first, one page at a time.
pub async fn list_topics(
    State(pool): State<PgPool>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, per_page, offset) = params
        .resolve(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
        .ok_or_else(|| AppError::BadRequest("Page is out of range".to_string()))?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
        .fetch_one(&pool)
        .await?;

    let topics = sqlx::query_as::<_, Topic>(
        r#"
        SELECT id, name, content, created_at
        FROM topics
        ORDER BY created_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list topics: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(TopicPage {
        topics,
        page,
        per_page,
        total,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

/// The caller's quiz attempts on a topic, newest first.
pub async fn list_topic_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(topic_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let topic_name: String = sqlx::query_scalar("SELECT name FROM topics WHERE id = $1")
        .bind(topic_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Topic not found".to_string()))?;

    let attempts = sqlx::query_as::<_, QuizAttempt>(
        r#"
        SELECT
            id, user_id, topic_name, subtopic, created_at, total_time_taken, score,
            total_possible_score, correct_attempts, incorrect_attempts,
            partial_attempts, unattempted
        FROM quiz_attempts
        WHERE user_id = $1 AND topic_name = $2
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .bind(&topic_name)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}
