use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::entities::{
    bookings::{BookingEntity, UpsertBookingEntity},
    payments::{PaymentEntity, PaymentTransition, UpsertPaymentEntity},
};
use crate::error::BookingResult;

/// Transactional store of record for bookings and payments. Row locks
/// (`SELECT ... FOR UPDATE`) serialize concurrent writers; missing rows
/// come back as `None`, not as errors.
#[automock]
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert-or-update keyed by id. With no id, a live booking matching
    /// the allocation natural key (same user and ticket detail, booking
    /// date in the same minute) is adopted instead of inserting a
    /// duplicate, which makes redelivered allocations idempotent.
    async fn upsert_booking(&self, booking: UpsertBookingEntity) -> BookingResult<Uuid>;

    /// Insert-or-update keyed by `booking_id` (one payment per booking).
    async fn upsert_payment(&self, payment: UpsertPaymentEntity) -> BookingResult<()>;

    async fn find_booking_by_id(&self, booking_id: Uuid) -> BookingResult<Option<BookingEntity>>;

    /// All of the user's bookings, newest first.
    async fn list_bookings_by_user_id(&self, user_id: i64) -> BookingResult<Vec<BookingEntity>>;

    async fn find_payment_by_booking_id(
        &self,
        booking_id: Uuid,
    ) -> BookingResult<Option<PaymentEntity>>;

    /// Seats currently held by the user: SUM of `total_tickets` over
    /// bookings whose payment is pending or paid. Backs the per-user
    /// quota check.
    async fn sum_held_tickets(&self, user_id: i64) -> BookingResult<i64>;

    async fn count_pending_payments(&self, ticket_detail_id: i64) -> BookingResult<i64>;

    /// pending -> paid, inside one row-locked transaction. Clears `task_id`.
    async fn mark_payment_paid(
        &self,
        booking_id: Uuid,
        payment_method: String,
        paid_at: DateTime<Utc>,
    ) -> BookingResult<PaymentTransition>;

    /// pending -> expired, applied only when `payment_expiration < now`.
    /// Both guards and the status write share the transaction, which is
    /// what resolves the paid/expire race.
    async fn mark_payment_expired(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentTransition>;

    /// pending -> cancelled, inside one row-locked transaction.
    async fn mark_payment_cancelled(&self, booking_id: Uuid) -> BookingResult<PaymentTransition>;
}
