//! REST route handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

/// Uniform JSON envelope for REST responses.
#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn ok(data: serde_json::Value) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
    }

    fn err(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                data: None,
                error: Some(message.into()),
            }),
        )
    }
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub user: String,
}

/// Handler for GET /api/sessions?user=<id>
///
/// Lists the user's persisted conversation metadata.
pub async fn list_sessions_handler(
    Query(query): Query<UserQuery>,
    State(state): State<Arc<SharedState>>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.metadata.list_for_user(&query.user) {
        Ok(records) => match serde_json::to_value(records) {
            Ok(data) => ApiResponse::ok(data),
            Err(err) => ApiResponse::err(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        Err(err) => {
            log::warn!("failed to list sessions for {}: {}", query.user, err);
            ApiResponse::err(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[derive(Deserialize)]
pub struct InterruptRequest {
    pub user: String,
}

/// Handler for POST /api/sessions/interrupt
///
/// Interrupts the user's in-flight request, if there is one.
pub async fn interrupt_handler(
    State(state): State<Arc<SharedState>>,
    Json(request): Json<InterruptRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let interrupted = state
        .registry
        .session_for(&request.user)
        .map(|session| session.interrupt())
        .unwrap_or(false);
    ApiResponse::ok(serde_json::json!({ "interrupted": interrupted }))
}
