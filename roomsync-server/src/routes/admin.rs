use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/verify", post(verify))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /admin/verify
async fn verify(State(state): State<AppState>, Json(request): Json<VerifyRequest>) -> Response {
    match state.settings.admin.password.as_deref() {
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(VerifyResponse {
                valid: false,
                error: Some("admin password is not configured".into()),
            }),
        )
            .into_response(),
        Some(expected) => {
            let valid = request.password == expected;
            if !valid {
                tracing::warn!("admin password rejected");
            }
            Json(VerifyResponse { valid, error: None }).into_response()
        }
    }
}
