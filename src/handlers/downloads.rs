// src/handlers/downloads.rs

use axum::{
    Extension, Json,
    extract::{Multipart, Query, State},
    response::IntoResponse,
};

use crate::{
    config::MAX_UPLOAD_BYTES,
    error::AppError,
    models::download::{DownloadUrlParams, QuizDownloadFile, UploadResponse, classify_upload},
    state::AppState,
    utils::jwt::Claims,
};

struct UploadForm {
    filename: Option<String>,
    bytes: Option<Vec<u8>>,
    quiz_attempt_id: Option<i64>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        filename: None,
        bytes: None,
        quiz_attempt_id: None,
    };

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart data".to_string()))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                form.filename = field.file_name().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| AppError::BadRequest("Failed to read file".to_string()))?
                {
                    if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                        return Err(AppError::BadRequest("File is too large".to_string()));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.bytes = Some(bytes);
            }
            "quiz_attempt_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|_| AppError::BadRequest("Invalid quiz_attempt_id".to_string()))?;
                let id = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::BadRequest("Invalid quiz_attempt_id".to_string()))?;
                form.quiz_attempt_id = Some(id);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Stores a generated quiz download file.
///
/// * Picks the storage bucket through the quota allocator.
/// * Uploads to that bucket's backend; on failure the reserved bytes are
///   released again.
/// * Records path and bucket so the file can be signed for download later.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let form = read_upload_form(multipart).await?;

    let (Some(filename), Some(bytes), Some(quiz_attempt_id)) =
        (form.filename, form.bytes, form.quiz_attempt_id)
    else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    let (kind, file_path) = classify_upload(quiz_attempt_id, &filename)
        .ok_or(AppError::BadRequest("Invalid file type".to_string()))?;

    let owned: Option<i64> =
        sqlx::query_scalar("SELECT id FROM quiz_attempts WHERE id = $1 AND user_id = $2")
            .bind(quiz_attempt_id)
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;
    if owned.is_none() {
        return Err(AppError::NotFound("Quiz attempt not found".to_string()));
    }

    let size = bytes.len() as u64;
    let storage_index = state.allocator.allocate(size).await?;
    let backend = state.blobs.get(storage_index).ok_or_else(|| AppError::ServiceUnavailable(format!(
        "no storage backend for bucket {}",
        storage_index
    )))?;

    if let Err(e) = backend.upload(&file_path, bytes, kind.content_type()).await {
        tracing::error!(storage_index, path = %file_path, "Upload failed: {}", e);
        if let Err(release_err) = state.allocator.release(storage_index, size).await {
            tracing::error!(storage_index, "Failed to release reserved quota: {}", release_err);
        }
        return Err(AppError::InternalServerError(format!("Upload failed: {}", e)));
    }

    sqlx::query(
        r#"
        INSERT INTO quiz_download_files (quiz_attempt_id, kind, path, storage_index, size_bytes)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (quiz_attempt_id, kind) DO UPDATE SET
            path = EXCLUDED.path,
            storage_index = EXCLUDED.storage_index,
            size_bytes = EXCLUDED.size_bytes,
            created_at = NOW()
        "#,
    )
    .bind(quiz_attempt_id)
    .bind(kind.as_str())
    .bind(&file_path)
    .bind(storage_index as i32)
    .bind(size as i64)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record quiz download: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(quiz_attempt_id, storage_index, size, path = %file_path, "Quiz download stored");

    Ok(Json(UploadResponse {
        file_path,
        kind,
        storage_index,
    }))
}

/// Returns a signed, time-limited URL for one of the caller's download files.
pub async fn get_download_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DownloadUrlParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let file = sqlx::query_as::<_, QuizDownloadFile>(
        r#"
        SELECT f.quiz_attempt_id, f.kind, f.path, f.storage_index, f.size_bytes, f.created_at
        FROM quiz_download_files f
        JOIN quiz_attempts a ON a.id = f.quiz_attempt_id
        WHERE f.quiz_attempt_id = $1 AND f.kind = $2 AND a.user_id = $3
        "#,
    )
    .bind(params.quiz_attempt_id)
    .bind(params.kind.as_str())
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Download not found".to_string()))?;

    let index = file.storage_index.max(0) as usize;
    let backend = state.blobs.get(index).ok_or_else(|| AppError::ServiceUnavailable(format!(
        "no storage backend for bucket {}",
        index
    )))?;

    let expires_in = state.config.storage.signed_url_ttl_secs;
    let url = state
        .signed_urls
        .get_or_sign(index, backend.as_ref(), &file.path, expires_in)
        .await?;

    Ok(Json(serde_json::json!({
        "url": url,
        "expires_in": expires_in,
        "file_path": file.path,
    })))
}
