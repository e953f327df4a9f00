use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::AppError;
use crate::mode::ProcessingMode;
use crate::services::AppState;

#[derive(Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[instrument(skip(state, payload))]
pub async fn ask(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = payload.question.unwrap_or_default();
    let document_id = payload.document_id.unwrap_or_default();

    let answer = state
        .qa_service
        .answer_question(&document_id, &question, payload.processing_mode)
        .await?;
    Ok(Json(AskResponse { answer }))
}
