use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::instrument;

use crate::errors::AppError;
use crate::services::AppState;

/// List all processed documents, freshly reloaded from disk so concurrent
/// worker processes observe each other's uploads.
#[instrument(skip(state))]
pub async fn list_documents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list().await)
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Set a recognizable label on a document. An empty or whitespace name
/// clears the label.
#[instrument(skip(state, payload))]
pub async fn update_document(
    State(state): State<AppState>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let document_id = payload
        .document_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::MissingField("document_id".to_string()))?;
    let display_name = payload
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let document = state
        .registry
        .update_display_name(&document_id, display_name)
        .await?;
    Ok(Json(document))
}
