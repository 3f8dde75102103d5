use axum::{Json, http::StatusCode, response::IntoResponse};

use super::error_responses::ErrorResponse;

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: StatusCode::NOT_FOUND.as_u16(),
            message: "route not found".to_string(),
        }),
    )
}
