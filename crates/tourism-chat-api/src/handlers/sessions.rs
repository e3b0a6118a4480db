use crate::models::{SessionResponse, StatusMessage};
use crate::storage::SessionStore;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// `GET /sessions/{session_id}`. Unknown ids read as an empty session.
pub async fn get_session_handler(
    State(store): State<SessionStore>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = store
        .get(&session_id)
        .await
        .map_err(|e| ApiError::StorageError(format!("Failed to load session {}: {:#}", session_id, e)))?;

    Ok(Json(match session {
        Some(session) => SessionResponse::from(session),
        None => SessionResponse::empty(session_id),
    }))
}

/// `DELETE /sessions/{session_id}`
pub async fn delete_session_handler(
    State(store): State<SessionStore>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    let removed = store
        .try_delete(&session_id)
        .await
        .map_err(|e| ApiError::StorageError(format!("Failed to delete session {}: {:#}", session_id, e)))?;

    if !removed {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }

    info!("Deleted session {}", session_id);
    Ok(Json(StatusMessage::new(format!(
        "Session {} deleted successfully",
        session_id
    ))))
}
