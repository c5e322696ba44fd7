// src/models/quiz_attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

/// Represents the 'quiz_attempts' table: one completed quiz session.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub topic_name: String,
    pub subtopic: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Seconds.
    pub total_time_taken: i32,
    pub score: f64,
    pub total_possible_score: f64,
    pub correct_attempts: i32,
    pub incorrect_attempts: i32,
    pub partial_attempts: i32,
    pub unattempted: i32,
}

/// Graded row of 'question_attempts' as needed by the statistics report.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionResultRow {
    pub quiz_attempt_id: i64,
    pub question_type: String,
    pub score: f64,
    pub is_correct: bool,
    pub is_partial: bool,
    pub time_taken: i32,
}

/// A question of a past attempt together with what the user picked.
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub question: String,
    pub question_type: String,
    pub options: Json<Vec<String>>,
    pub correct_answers: Json<Vec<String>>,
    pub explanation: String,
    pub attempted_options: Json<Vec<String>>,
    pub time_taken: i32,
    pub score: f64,
    pub is_correct: bool,
    pub is_partial: bool,
}

/// DTO for one answered question inside `SaveAttemptRequest`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionAttemptInput {
    pub question_id: i64,
    /// Seconds.
    pub time_taken: i32,
    #[serde(default)]
    pub attempted_options: Vec<String>,
}

/// DTO for saving a finished quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveAttemptRequest {
    #[validate(length(min = 1, max = 255))]
    pub topic_name: String,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub subtopic: String,
    #[validate(range(min = 0))]
    pub total_time_taken: i32,
    #[validate(length(min = 1, max = 200))]
    pub question_attempts: Vec<QuestionAttemptInput>,
}

#[derive(Debug, Serialize)]
pub struct SaveAttemptResponse {
    pub quiz_attempt_id: i64,
    pub score: f64,
    pub total_possible_score: f64,
    pub correct_attempts: i32,
    pub incorrect_attempts: i32,
    pub partial_attempts: i32,
    pub unattempted: i32,
    /// Question ids that were not found in the bank and were skipped.
    pub skipped_question_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(answers: usize) -> SaveAttemptRequest {
        SaveAttemptRequest {
            topic_name: "Rust".to_string(),
            subtopic: String::new(),
            total_time_taken: 60,
            question_attempts: (0..answers)
                .map(|i| QuestionAttemptInput {
                    question_id: i as i64,
                    time_taken: 5,
                    attempted_options: vec!["A".to_string()],
                })
                .collect(),
        }
    }

    #[test]
    fn attempt_needs_between_one_and_two_hundred_answers() {
        assert!(request(1).validate().is_ok());
        assert!(request(200).validate().is_ok());

        let errors = request(0).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("question_attempts"));
        assert!(request(201).validate().is_err());
    }

    #[test]
    fn negative_total_time_is_rejected() {
        let mut req = request(1);
        req.total_time_taken = -1;
        assert!(req.validate().is_err());
    }
}
