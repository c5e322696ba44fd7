// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::services::stats::QuestionType;

/// Represents the 'quiz_questions' table (the question bank).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: i64,

    pub topic: String,

    pub subtopic: String,

    /// 'mcq', 'true-false' or 'multiple-correct'.
    pub question_type: String,

    /// The text of the question. Unique across the bank.
    pub question: String,

    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// Subset of `options`, stored as a JSON array.
    pub correct_answers: Json<Vec<String>>,

    pub explanation: String,

    /// 'generated' or 'manual'.
    pub source: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for sending a question to a quiz taker (no answers, no explanation).
#[derive(Debug, Serialize, FromRow)]
pub struct PublicQuestion {
    pub id: i64,
    pub topic: String,
    pub subtopic: String,
    pub question_type: String,
    pub question: String,
    pub options: Json<Vec<String>>,
}

/// DTO for adding a question to the bank.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 255))]
    pub topic: String,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub subtopic: String,
    #[validate(custom(function = validate_question_type))]
    pub question_type: String,
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(custom(function = validate_options))]
    pub correct_answers: Vec<String>,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub explanation: String,
}

/// Query parameters for `GET /api/quiz/questions`.
#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    pub topic: String,
    pub subtopic: Option<String>,
    pub question_type: Option<String>,
    pub count: Option<i64>,
}

fn validate_question_type(question_type: &str) -> Result<(), validator::ValidationError> {
    if QuestionType::from(question_type).is_known() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("unknown_question_type"))
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
