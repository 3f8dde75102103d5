use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use domain::error::BookingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

/// HTTP-facing wrapper mapping the error taxonomy one-to-one onto statuses.
#[derive(Debug)]
pub struct HttpError(pub BookingError);

impl From<BookingError> for HttpError {
    fn from(err: BookingError) -> Self {
        HttpError(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            BookingError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            BookingError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            BookingError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
            BookingError::Dependency(message) => {
                error!(%message, "request failed on upstream dependency");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "upstream dependency unavailable".to_string(),
                )
            }
            BookingError::Internal(err) => {
                // Don't leak internal error detail to the client.
                error!(%err, "request failed internally");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
