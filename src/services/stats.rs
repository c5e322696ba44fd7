// src/services/stats.rs

//! Quiz statistics aggregation.
//!
//! `aggregate` turns a user's attempt history into the report served by
//! `GET /api/quiz/stats`. It is a pure function over a snapshot: no I/O, no
//! locking, no errors.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of a question in the bank.
///
/// Anything outside the three known kinds is kept verbatim as `Other`, so it
/// still shows up in the global counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Mcq,
    TrueFalse,
    MultipleCorrect,
    Other(String),
}

impl QuestionType {
    pub fn as_str(&self) -> &str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::TrueFalse => "true-false",
            QuestionType::MultipleCorrect => "multiple-correct",
            QuestionType::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, QuestionType::Other(_))
    }
}

impl From<&str> for QuestionType {
    fn from(raw: &str) -> Self {
        match raw {
            "mcq" => QuestionType::Mcq,
            "true-false" => QuestionType::TrueFalse,
            "multiple-correct" => QuestionType::MultipleCorrect,
            other => QuestionType::Other(other.to_string()),
        }
    }
}

impl From<String> for QuestionType {
    fn from(raw: String) -> Self {
        QuestionType::from(raw.as_str())
    }
}

impl Serialize for QuestionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuestionType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QuestionType::from(raw))
    }
}

/// Graded result of a single question inside an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_type: QuestionType,
    pub score: f64,
    pub is_correct: bool,
    pub is_partial: bool,
    pub time_taken_seconds: u64,
}

/// One scored quiz attempt, as fed to [`aggregate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttemptRecord {
    pub created_at: DateTime<Utc>,
    pub topic_name: String,
    pub subtopic: String,
    pub total_time_taken_seconds: u64,
    pub total_possible_score: f64,
    pub questions: Vec<QuestionResult>,
}

/// Per-topic sub-counts of the three known question types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuestionTypeBreakdown {
    pub mcq: u64,
    #[serde(rename = "true-false")]
    pub true_false: u64,
    #[serde(rename = "multiple-correct")]
    pub multiple_correct: u64,
}

impl QuestionTypeBreakdown {
    fn bump(&mut self, question_type: &QuestionType) {
        match question_type {
            QuestionType::Mcq => self.mcq += 1,
            QuestionType::TrueFalse => self.true_false += 1,
            QuestionType::MultipleCorrect => self.multiple_correct += 1,
            QuestionType::Other(_) => {}
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicStats {
    pub quiz_count: u64,
    pub avg_score: i64,
    pub question_types: QuestionTypeBreakdown,
    #[serde(skip)]
    total_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeScorePoint {
    pub topic: String,
    pub minutes: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TypePerformance {
    pub accuracy_percent: f64,
    pub avg_time_minutes: f64,
    #[serde(skip)]
    total_questions: u64,
    #[serde(skip)]
    correct_answers: u64,
    #[serde(skip)]
    accumulated_time: u64,
    #[serde(skip)]
    attempts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionPoint {
    pub date: String,
    pub score: f64,
    pub topic: String,
    pub cumulative_avg: f64,
}

/// Everything `GET /api/quiz/stats` returns.
///
/// Map fields iterate in order of first occurrence in the input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedReport {
    pub topic_stats: IndexMap<String, TopicStats>,
    pub question_type_counts: IndexMap<String, u64>,
    pub score_distribution: IndexMap<String, u64>,
    pub time_vs_score: Vec<TimeScorePoint>,
    pub performance_by_question_type: IndexMap<String, TypePerformance>,
    pub score_progression: Vec<ProgressionPoint>,
    pub average_percentage: Option<f64>,
    pub total_quizzes: u64,
    pub distinct_topic_count: u64,
    pub total_time_spent_seconds: u64,
}

/// Rounds half to even at `decimals` places, like the platform's historical
/// report numbers.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Label of the ten-point bucket holding `score`, e.g. `"30-39"`.
pub fn score_bucket_label(score: f64) -> String {
    let low = (score / 10.0).floor() as i64 * 10;
    format!("{}-{}", low, low + 9)
}

/// Builds the statistics report for an attempt history.
///
/// Attempts without question results are treated as not yet scored and
/// skipped. An attempt is classified by the type of its first question.
pub fn aggregate(attempts: &[QuizAttemptRecord]) -> AggregatedReport {
    let mut report = AggregatedReport::default();
    let mut percentage_sum = 0.0;
    let mut topics: HashSet<&str> = HashSet::new();
    let mut progression: Vec<(String, f64, &str)> = Vec::new();

    for attempt in attempts {
        let Some(first) = attempt.questions.first() else {
            continue;
        };
        let question_type = &first.question_type;
        let type_key = question_type.as_str();

        let total_score: f64 = attempt.questions.iter().map(|q| q.score).sum();
        let percentage = if attempt.total_possible_score > 0.0 {
            round_to(total_score / attempt.total_possible_score * 100.0, 2)
        } else {
            0.0
        };

        report.total_quizzes += 1;
        percentage_sum += percentage;
        topics.insert(attempt.topic_name.as_str());
        report.total_time_spent_seconds += attempt.total_time_taken_seconds;

        let topic = report
            .topic_stats
            .entry(attempt.topic_name.clone())
            .or_default();
        topic.quiz_count += 1;
        topic.total_score += total_score;
        topic.avg_score = (topic.total_score / topic.quiz_count as f64).round_ties_even() as i64;
        topic.question_types.bump(question_type);

        *report
            .question_type_counts
            .entry(type_key.to_string())
            .or_insert(0) += 1;

        *report
            .score_distribution
            .entry(score_bucket_label(total_score))
            .or_insert(0) += 1;

        report.time_vs_score.push(TimeScorePoint {
            topic: attempt.topic_name.clone(),
            minutes: attempt.total_time_taken_seconds as f64 / 60.0,
            percentage,
        });

        let performance = report
            .performance_by_question_type
            .entry(type_key.to_string())
            .or_default();
        performance.total_questions += attempt.questions.len() as u64;
        performance.correct_answers += attempt.questions.iter().filter(|q| q.is_correct).count() as u64;
        performance.accumulated_time += attempt.total_time_taken_seconds;
        performance.attempts += 1;

        progression.push((
            attempt.created_at.format("%Y-%m-%d").to_string(),
            total_score,
            attempt.topic_name.as_str(),
        ));
    }

    for performance in report.performance_by_question_type.values_mut() {
        performance.accuracy_percent = if performance.total_questions > 0 {
            performance.correct_answers as f64 / performance.total_questions as f64 * 100.0
        } else {
            0.0
        };
        performance.avg_time_minutes =
            performance.accumulated_time as f64 / performance.attempts as f64 / 60.0;
    }

    // Vec::sort_by is stable: same-day attempts keep their input order.
    progression.sort_by(|a, b| a.0.cmp(&b.0));
    let mut cumulative_sum = 0.0;
    report.score_progression = progression
        .into_iter()
        .enumerate()
        .map(|(position, (date, score, topic))| {
            cumulative_sum += score;
            ProgressionPoint {
                date,
                score,
                topic: topic.to_string(),
                cumulative_avg: cumulative_sum / (position + 1) as f64,
            }
        })
        .collect();

    report.average_percentage = if report.total_quizzes > 0 {
        Some(round_to(percentage_sum / report.total_quizzes as f64, 2))
    } else {
        None
    };
    report.distinct_topic_count = topics.len() as u64;

    report
}
