use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{bookings::BookingEntity, payments::PaymentEntity};

/// Body of `POST /book`. The authenticated user id is taken from the
/// request context, never from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTicketModel {
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
    pub full_name: String,
    pub personal_id: String,
}

/// Body of `POST /payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentModel {
    pub booking_id: Uuid,
    pub payment_method: String,
}

/// Body of `POST /payment/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCancelModel {
    pub booking_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookedTicketDto {
    pub id: Uuid,
    pub full_name: String,
    pub personal_id: String,
    pub booking_date: String,
    pub payment_expiry: String,
    pub total_amount: f64,
    pub payment_method: String,
    pub status: String,
}

impl BookedTicketDto {
    pub fn from_entities(booking: BookingEntity, payment: PaymentEntity) -> Self {
        Self {
            id: booking.id,
            full_name: booking.full_name,
            personal_id: booking.personal_id,
            booking_date: format_booking_timestamp(booking.booking_date),
            payment_expiry: format_booking_timestamp(payment.payment_expiration),
            total_amount: payment.amount.to_f64().unwrap_or_default(),
            payment_method: payment.payment_method,
            status: payment.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingPaymentCountDto {
    pub ticket_detail_id: i64,
    pub pending_payments: i64,
}

fn format_booking_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}
