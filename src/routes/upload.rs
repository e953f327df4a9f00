use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::instrument;

use crate::errors::AppError;
use crate::mode::ProcessingMode;
use crate::services::ingest::IngestStatus;
use crate::services::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub document_id: String,
}

#[instrument(skip(state, multipart))]
pub async fn upload_simple(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    handle_upload(state, multipart, ProcessingMode::Simple).await
}

#[instrument(skip(state, multipart))]
pub async fn upload_advanced(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    handle_upload(state, multipart, ProcessingMode::Advanced).await
}

async fn handle_upload(
    state: AppState,
    mut multipart: Multipart,
    mode: ProcessingMode,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) = file.ok_or_else(|| AppError::MissingField("file".to_string()))?;
    let outcome = state.ingest_service.ingest(mode, &filename, &bytes).await?;

    let message = match outcome.status {
        IngestStatus::AlreadyProcessed => "File already processed".to_string(),
        IngestStatus::Processed(_) => match mode {
            ProcessingMode::Simple => "File successfully uploaded and processed".to_string(),
            ProcessingMode::Advanced => {
                "File successfully uploaded and processed with advanced processing".to_string()
            }
        },
    };
    Ok(Json(UploadResponse {
        message,
        document_id: outcome.document_id,
    }))
}
