use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use super::AppState;
use crate::auth::AuthUser;
use crate::axum_http::error_responses::HttpError;
use domain::value_objects::bookings::BookTicketModel;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/book", post(book_ticket))
        .route("/bookings", get(show_bookings))
        .with_state(state)
}

pub async fn book_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BookTicketModel>,
) -> Result<impl IntoResponse, HttpError> {
    state
        .usecase
        .book_ticket(&payload, auth.user_id, &auth.email_user)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "your ticket has been queued" })),
    ))
}

pub async fn show_bookings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, HttpError> {
    let booked = state.usecase.show_bookings(auth.user_id).await?;

    Ok((StatusCode::OK, Json(json!({ "data": booked }))))
}
