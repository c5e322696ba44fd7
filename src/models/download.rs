// src/models/download.rs

use std::{path::Path, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents one row of 'quiz_download_files'.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizDownloadFile {
    pub quiz_attempt_id: i64,
    pub kind: String,
    pub path: String,
    /// Storage bucket the file was written to.
    pub storage_index: i32,
    pub size_bytes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The downloadable files generated for a quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    QuestionsTxt,
    QuestionsPdf,
    AnswersTxt,
    AnswersPdf,
    UserAttemptTxt,
    UserAttemptPdf,
    ReportPdf,
}

impl DownloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadKind::QuestionsTxt => "questions_txt",
            DownloadKind::QuestionsPdf => "questions_pdf",
            DownloadKind::AnswersTxt => "answers_txt",
            DownloadKind::AnswersPdf => "answers_pdf",
            DownloadKind::UserAttemptTxt => "user_attempt_txt",
            DownloadKind::UserAttemptPdf => "user_attempt_pdf",
            DownloadKind::ReportPdf => "report_pdf",
        }
    }

    /// Folder under `quiz_downloads/{attempt}/`.
    pub fn directory(self) -> &'static str {
        match self {
            DownloadKind::QuestionsTxt | DownloadKind::QuestionsPdf => "questions",
            DownloadKind::AnswersTxt | DownloadKind::AnswersPdf => "answer_key",
            DownloadKind::UserAttemptTxt | DownloadKind::UserAttemptPdf => "attempts_and_answers",
            DownloadKind::ReportPdf => "report_card",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DownloadKind::QuestionsTxt | DownloadKind::AnswersTxt | DownloadKind::UserAttemptTxt => {
                "text/plain; charset=utf-8"
            }
            _ => "application/pdf",
        }
    }
}

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-]{0,200}$").expect("filename pattern is valid")
});

/// Maps an uploaded file name to its kind and storage path.
///
/// The stem's suffix picks the kind: `..._questions`, `..._answer_key`,
/// `..._attempts_and_answers` (txt or pdf) and `..._report_card` (pdf only).
pub fn classify_upload(quiz_attempt_id: i64, filename: &str) -> Option<(DownloadKind, String)> {
    if !FILENAME_RE.is_match(filename) || filename.contains("..") {
        return None;
    }

    let path = Path::new(filename);
    let stem = path.file_stem()?.to_str()?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let kind = match (stem, extension) {
        (s, "txt") if s.ends_with("questions") => DownloadKind::QuestionsTxt,
        (s, "pdf") if s.ends_with("questions") => DownloadKind::QuestionsPdf,
        (s, "txt") if s.ends_with("answer_key") => DownloadKind::AnswersTxt,
        (s, "pdf") if s.ends_with("answer_key") => DownloadKind::AnswersPdf,
        (s, "txt") if s.ends_with("attempts_and_answers") => DownloadKind::UserAttemptTxt,
        (s, "pdf") if s.ends_with("attempts_and_answers") => DownloadKind::UserAttemptPdf,
        (s, "pdf") if s.ends_with("report_card") => DownloadKind::ReportPdf,
        _ => return None,
    };

    let storage_path = format!(
        "quiz_downloads/{}/{}/{}",
        quiz_attempt_id,
        kind.directory(),
        filename
    );
    Some((kind, storage_path))
}

/// Query parameters for `GET /api/downloads/url`.
#[derive(Debug, Deserialize)]
pub struct DownloadUrlParams {
    pub quiz_attempt_id: i64,
    pub kind: DownloadKind,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_path: String,
    pub kind: DownloadKind,
    pub storage_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_suffixes() {
        assert_eq!(
            classify_upload(7, "quiz_questions.pdf"),
            Some((
                DownloadKind::QuestionsPdf,
                "quiz_downloads/7/questions/quiz_questions.pdf".to_string()
            ))
        );
        assert_eq!(
            classify_upload(7, "rust_answer_key.txt").map(|(k, _)| k),
            Some(DownloadKind::AnswersTxt)
        );
        assert_eq!(
            classify_upload(7, "rust_attempts_and_answers.pdf").map(|(k, _)| k),
            Some(DownloadKind::UserAttemptPdf)
        );
        assert_eq!(
            classify_upload(7, "report_card.pdf").map(|(k, p)| (k, p)),
            Some((
                DownloadKind::ReportPdf,
                "quiz_downloads/7/report_card/report_card.pdf".to_string()
            ))
        );
    }

    #[test]
    fn rejects_unknown_names_and_extensions() {
        assert_eq!(classify_upload(1, "notes.pdf"), None);
        assert_eq!(classify_upload(1, "report_card.txt"), None);
        assert_eq!(classify_upload(1, "quiz_questions.docx"), None);
    }

    #[test]
    fn rejects_path_tricks() {
        assert_eq!(classify_upload(1, "../x_questions.pdf"), None);
        assert_eq!(classify_upload(1, "a/b_questions.pdf"), None);
        assert_eq!(classify_upload(1, "x..questions.pdf"), None);
    }
}
