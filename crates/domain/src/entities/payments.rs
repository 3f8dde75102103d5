use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::payments;
use crate::value_objects::enums::payment_statuses::PaymentStatus;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: i64,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub payment_date: DateTime<Utc>,
    pub payment_expiration: DateTime<Utc>,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PaymentEntity {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub payment_date: DateTime<Utc>,
    pub payment_expiration: DateTime<Utc>,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert input keyed by `booking_id` (UNIQUE: one payment per booking).
#[derive(Debug, Clone)]
pub struct UpsertPaymentEntity {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub payment_date: DateTime<Utc>,
    pub payment_expiration: DateTime<Utc>,
    pub task_id: Option<String>,
}

/// Outcome of a row-locked payment status transition. The pending check and
/// the status write happen in one transaction; a racing caller observes
/// `NotPending` and must treat the transition as a no-op.
#[derive(Debug, Clone)]
pub enum PaymentTransition {
    Applied(PaymentEntity),
    NotPending(String),
    NotFound,
}
