use crate::models::chat::ChatRequest;
use crate::services::conversation::ConversationManager;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// `POST /chat`. The reply is returned as a JSON string.
pub async fn chat_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<String>, ApiError> {
    let start_time = Instant::now();

    if request.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id must not be empty".to_string()));
    }
    if request.user_message.trim().is_empty() {
        return Err(ApiError::BadRequest("user_message must not be empty".to_string()));
    }

    info!(
        "Chat request: session={}, message_len={}, user={}",
        request.session_id,
        request.user_message.len(),
        request.user_id.as_deref().unwrap_or("-")
    );

    let reply = manager
        .handle_chat(
            &request.session_id,
            &request.user_message,
            request.user_id.as_deref(),
        )
        .await;

    info!(
        "Chat reply for session {} in {:?}",
        request.session_id,
        start_time.elapsed()
    );

    Ok(Json(reply))
}
