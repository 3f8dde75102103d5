use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::auth::AuthUser;
use crate::axum_http::error_responses::HttpError;
use domain::value_objects::bookings::{PaymentCancelModel, PaymentModel};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/payment", post(payment))
        .route("/payment/cancel", post(payment_cancel))
        .route("/payment/pending", get(count_pending_payment))
        .with_state(state)
}

pub async fn payment(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<PaymentModel>,
) -> Result<impl IntoResponse, HttpError> {
    state.usecase.payment(&payload).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "your payment has been paid" })),
    ))
}

pub async fn payment_cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<PaymentCancelModel>,
) -> Result<impl IntoResponse, HttpError> {
    state.usecase.payment_cancel(&payload, auth.user_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "your booking has been cancelled" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PendingPaymentQuery {
    pub ticket_detail_id: i64,
}

pub async fn count_pending_payment(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<PendingPaymentQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let count = state
        .usecase
        .count_pending_payment(query.ticket_detail_id)
        .await?;

    Ok((StatusCode::OK, Json(json!({ "data": count }))))
}
