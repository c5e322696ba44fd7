// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::{ATTEMPTS_KEPT_PER_USER, Config, DEFAULT_QUIZ_QUESTION_COUNT, MAX_QUIZ_QUESTION_COUNT},
    error::AppError,
    models::{
        question::{PublicQuestion, QuestionQuery},
        quiz_attempt::{
            AttemptQuestion, QuestionResultRow, SaveAttemptRequest, SaveAttemptResponse,
        },
    },
    services::{
        grading::{CORRECT_SCORE, grade_answer},
        quiz_source::SourcingDecision,
        stats::{QuestionResult, QuizAttemptRecord, aggregate},
    },
    utils::jwt::Claims,
};

/// Helper struct for fetching answer keys from the bank.
#[derive(sqlx::FromRow)]
struct AnswerKey {
    id: i64,
    question_type: String,
    correct_answers: SqlJson<Vec<String>>,
}

/// Attempt header row used to build statistics records.
#[derive(sqlx::FromRow)]
struct AttemptHeader {
    id: i64,
    created_at: DateTime<Utc>,
    topic_name: String,
    subtopic: String,
    total_time_taken: i32,
    total_possible_score: f64,
}

/// Returns questions for a new quiz from the question bank.
///
/// The configured sourcing policy decides whether the bank is enough. When
/// it is not, the response carries the shortfall the content generator has
/// to fill.
pub async fn get_questions(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Query(params): Query<QuestionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let requested = params
        .count
        .unwrap_or(DEFAULT_QUIZ_QUESTION_COUNT)
        .clamp(1, MAX_QUIZ_QUESTION_COUNT);

    let available: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM quiz_questions
        WHERE topic = $1
          AND ($2::TEXT IS NULL OR subtopic = $2)
          AND ($3::TEXT IS NULL OR question_type = $3)
        "#,
    )
    .bind(&params.topic)
    .bind(&params.subtopic)
    .bind(&params.question_type)
    .fetch_one(&pool)
    .await?;

    let decision = config
        .quiz_sourcing
        .decide(available as usize, requested as usize);
    let serve = match decision {
        SourcingDecision::Cache { count } => count,
        SourcingDecision::Generate { cached, .. } => cached,
    };

    let questions = sqlx::query_as::<_, PublicQuestion>(
        r#"
        SELECT id, topic, subtopic, question_type, question, options
        FROM quiz_questions
        WHERE topic = $1
          AND ($2::TEXT IS NULL OR subtopic = $2)
          AND ($3::TEXT IS NULL OR question_type = $3)
        ORDER BY RANDOM()
        LIMIT $4
        "#,
    )
    .bind(&params.topic)
    .bind(&params.subtopic)
    .bind(&params.question_type)
    .bind(serve as i64)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if let SourcingDecision::Generate { missing, .. } = decision {
        tracing::info!(topic = %params.topic, missing, "Question bank short for quiz");
    }

    Ok(Json(serde_json::json!({
        "questions": questions,
        "sourcing": decision,
    })))
}

/// Saves a finished quiz attempt.
///
/// * Grades each answer against the bank; unknown question ids are skipped.
/// * Stores the attempt and its question results in one transaction.
/// * Keeps only the user's latest `ATTEMPTS_KEPT_PER_USER` attempts.
pub async fn save_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SaveAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let user_id = claims.user_id()?;

    let ids: Vec<i64> = req.question_attempts.iter().map(|q| q.question_id).collect();
    let keys: HashMap<i64, AnswerKey> = sqlx::query_as::<_, AnswerKey>(
        "SELECT id, question_type, correct_answers FROM quiz_questions WHERE id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|k| (k.id, k))
    .collect();

    let mut graded = Vec::with_capacity(req.question_attempts.len());
    let mut skipped_question_ids = Vec::new();
    for answer in &req.question_attempts {
        match keys.get(&answer.question_id) {
            Some(key) => {
                let grade = grade_answer(&key.correct_answers, &answer.attempted_options);
                graded.push((answer, key, grade));
            }
            None => skipped_question_ids.push(answer.question_id),
        }
    }

    let score: f64 = graded.iter().map(|(_, _, g)| g.score).sum();
    let total_possible_score = graded.len() as f64 * CORRECT_SCORE;
    let correct_attempts = graded.iter().filter(|(_, _, g)| g.is_correct).count() as i32;
    let partial_attempts = graded.iter().filter(|(_, _, g)| g.is_partial).count() as i32;
    let unattempted = graded.iter().filter(|(_, _, g)| g.unattempted).count() as i32;
    let incorrect_attempts = graded.len() as i32 - correct_attempts - partial_attempts - unattempted;

    let mut tx = pool.begin().await?;

    let quiz_attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quiz_attempts (
            user_id, topic_name, subtopic, total_time_taken, score, total_possible_score,
            correct_attempts, incorrect_attempts, partial_attempts, unattempted
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&req.topic_name)
    .bind(&req.subtopic)
    .bind(req.total_time_taken)
    .bind(score)
    .bind(total_possible_score)
    .bind(correct_attempts)
    .bind(incorrect_attempts)
    .bind(partial_attempts)
    .bind(unattempted)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to insert quiz attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    for (answer, key, grade) in &graded {
        sqlx::query(
            r#"
            INSERT INTO question_attempts (
                quiz_attempt_id, question_id, question_type, time_taken,
                attempted_options, score, is_correct, is_partial
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(quiz_attempt_id)
        .bind(answer.question_id)
        .bind(&key.question_type)
        .bind(answer.time_taken.max(0))
        .bind(SqlJson(answer.attempted_options.clone()))
        .bind(grade.score)
        .bind(grade.is_correct)
        .bind(grade.is_partial)
        .execute(&mut *tx)
        .await?;
    }

    let pruned = sqlx::query(
        r#"
        DELETE FROM quiz_attempts
        WHERE user_id = $1
          AND id NOT IN (
            SELECT id FROM quiz_attempts
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
          )
        "#,
    )
    .bind(user_id)
    .bind(ATTEMPTS_KEPT_PER_USER)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    tracing::info!(
        user_id,
        quiz_attempt_id,
        score,
        pruned,
        "Quiz attempt saved"
    );

    Ok((
        StatusCode::CREATED,
        Json(SaveAttemptResponse {
            quiz_attempt_id,
            score,
            total_possible_score,
            correct_attempts,
            incorrect_attempts,
            partial_attempts,
            unattempted,
            skipped_question_ids,
        }),
    ))
}

/// Lists the questions of one of the caller's attempts with their answers.
pub async fn get_attempt_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let owned: Option<i64> =
        sqlx::query_scalar("SELECT id FROM quiz_attempts WHERE id = $1 AND user_id = $2")
            .bind(quiz_attempt_id)
            .bind(user_id)
            .fetch_optional(&pool)
            .await?;
    if owned.is_none() {
        return Err(AppError::NotFound("Quiz attempt not found".to_string()));
    }

    let questions = sqlx::query_as::<_, AttemptQuestion>(
        r#"
        SELECT
            q.id AS question_id, q.question, qa.question_type, q.options,
            q.correct_answers, q.explanation, qa.attempted_options,
            qa.time_taken, qa.score, qa.is_correct, qa.is_partial
        FROM question_attempts qa
        JOIN quiz_questions q ON q.id = qa.question_id
        WHERE qa.quiz_attempt_id = $1
        ORDER BY qa.id
        "#,
    )
    .bind(quiz_attempt_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}

/// Loads the user's attempts, oldest first, with their question results.
async fn load_attempt_records(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<QuizAttemptRecord>, sqlx::Error> {
    let headers = sqlx::query_as::<_, AttemptHeader>(
        r#"
        SELECT id, created_at, topic_name, subtopic, total_time_taken, total_possible_score
        FROM quiz_attempts
        WHERE user_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let rows = sqlx::query_as::<_, QuestionResultRow>(
        r#"
        SELECT qa.quiz_attempt_id, qa.question_type, qa.score, qa.is_correct,
               qa.is_partial, qa.time_taken
        FROM question_attempts qa
        JOIN quiz_attempts a ON a.id = qa.quiz_attempt_id
        WHERE a.user_id = $1
        ORDER BY qa.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut results: HashMap<i64, Vec<QuestionResult>> = HashMap::new();
    for row in rows {
        results
            .entry(row.quiz_attempt_id)
            .or_default()
            .push(QuestionResult {
                question_type: row.question_type.into(),
                score: row.score,
                is_correct: row.is_correct,
                is_partial: row.is_partial,
                time_taken_seconds: row.time_taken.max(0) as u64,
            });
    }

    Ok(headers
        .into_iter()
        .map(|h| QuizAttemptRecord {
            questions: results.remove(&h.id).unwrap_or_default(),
            created_at: h.created_at,
            topic_name: h.topic_name,
            subtopic: h.subtopic,
            total_time_taken_seconds: h.total_time_taken.max(0) as u64,
            total_possible_score: h.total_possible_score,
        })
        .collect())
}

/// Statistics over all of the caller's stored attempts.
pub async fn get_stats(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let records = load_attempt_records(&pool, user_id).await.map_err(|e| {
        tracing::error!("Failed to load quiz attempts for stats: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(aggregate(&records)))
}
