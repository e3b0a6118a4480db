use crate::models::StatusMessage;
use crate::storage::SessionStore;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    storage: String,
}

/// `GET /`
pub async fn root() -> Json<StatusMessage> {
    Json(StatusMessage::new("Uttarakhand tourism chatbot API is running"))
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Ready once the session backend answers.
pub async fn readiness_check(
    State(store): State<SessionStore>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                storage: store.backend_name().to_string(),
            }),
        ),
        Err(e) => {
            warn!("Readiness check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable".to_string(),
                    storage: store.backend_name().to_string(),
                }),
            )
        }
    }
}
