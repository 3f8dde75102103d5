use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::{
        bookings::{BookingEntity, InsertBookingEntity, UpsertBookingEntity},
        payments::{InsertPaymentEntity, PaymentEntity, PaymentTransition, UpsertPaymentEntity},
    },
    error::BookingResult,
    repositories::booking_store::BookingStore,
    schema::{bookings, payments},
    value_objects::enums::payment_statuses::PaymentStatus,
};

/// Statuses that hold seats against the user quota and the stock ledger.
const HELD_STATUSES: [&str; 2] = ["pending", "paid"];

pub struct BookingStorePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BookingStorePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    fn conn(
        &self,
    ) -> AnyResult<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>>
    {
        Ok(Arc::clone(&self.db_pool).get()?)
    }
}

#[async_trait]
impl BookingStore for BookingStorePostgres {
    async fn upsert_booking(&self, booking: UpsertBookingEntity) -> BookingResult<Uuid> {
        let mut conn = self.conn()?;
        let now = Utc::now();

        let id = conn.transaction::<Uuid, anyhow::Error, _>(|conn| {
            // Lock the row we are about to write. With no id we look for a
            // live booking on the allocation natural key so a redelivered
            // message adopts the row it created the first time around.
            let existing: Option<BookingEntity> = match booking.id {
                Some(id) => bookings::table
                    .filter(bookings::id.eq(id))
                    .select(BookingEntity::as_select())
                    .for_update()
                    .first::<BookingEntity>(conn)
                    .optional()?,
                None => {
                    let minute_start = booking
                        .booking_date
                        .duration_trunc(Duration::minutes(1))?;
                    bookings::table
                        .filter(bookings::user_id.eq(booking.user_id))
                        .filter(bookings::ticket_detail_id.eq(booking.ticket_detail_id))
                        .filter(bookings::booking_date.ge(minute_start))
                        .filter(bookings::booking_date.lt(minute_start + Duration::minutes(1)))
                        .filter(bookings::deleted_at.is_null())
                        .select(BookingEntity::as_select())
                        .for_update()
                        .first::<BookingEntity>(conn)
                        .optional()?
                }
            };

            let id = match existing {
                Some(existing) => diesel::update(bookings::table.find(existing.id))
                    .set((
                        bookings::user_id.eq(booking.user_id),
                        bookings::ticket_detail_id.eq(booking.ticket_detail_id),
                        bookings::total_tickets.eq(booking.total_tickets),
                        bookings::full_name.eq(&booking.full_name),
                        bookings::personal_id.eq(&booking.personal_id),
                        bookings::booking_date.eq(booking.booking_date),
                        bookings::updated_at.eq(now),
                    ))
                    .returning(bookings::id)
                    .get_result::<Uuid>(conn)?,
                None => {
                    let insert_entity = InsertBookingEntity {
                        user_id: booking.user_id,
                        ticket_detail_id: booking.ticket_detail_id,
                        total_tickets: booking.total_tickets,
                        full_name: booking.full_name.clone(),
                        personal_id: booking.personal_id.clone(),
                        booking_date: booking.booking_date,
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(bookings::table)
                        .values(&insert_entity)
                        .returning(bookings::id)
                        .get_result::<Uuid>(conn)?
                }
            };

            Ok(id)
        })?;

        Ok(id)
    }

    async fn upsert_payment(&self, payment: UpsertPaymentEntity) -> BookingResult<()> {
        let mut conn = self.conn()?;
        let now = Utc::now();

        conn.transaction::<(), anyhow::Error, _>(|conn| {
            let existing: Option<PaymentEntity> = payments::table
                .filter(payments::booking_id.eq(payment.booking_id))
                .select(PaymentEntity::as_select())
                .for_update()
                .first::<PaymentEntity>(conn)
                .optional()?;

            match existing {
                Some(existing) => {
                    diesel::update(payments::table.find(existing.id))
                        .set((
                            payments::amount.eq(&payment.amount),
                            payments::currency.eq(&payment.currency),
                            payments::status.eq(payment.status.as_str()),
                            payments::payment_method.eq(&payment.payment_method),
                            payments::payment_date.eq(payment.payment_date),
                            payments::payment_expiration.eq(payment.payment_expiration),
                            payments::task_id.eq(&payment.task_id),
                            payments::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }
                None => {
                    let insert_entity = InsertPaymentEntity {
                        booking_id: payment.booking_id,
                        amount: payment.amount,
                        currency: payment.currency.clone(),
                        status: payment.status.as_str().to_string(),
                        payment_method: payment.payment_method.clone(),
                        payment_date: payment.payment_date,
                        payment_expiration: payment.payment_expiration,
                        task_id: payment.task_id.clone(),
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(payments::table)
                        .values(&insert_entity)
                        .execute(conn)?;
                }
            }

            Ok(())
        })?;

        Ok(())
    }

    async fn find_booking_by_id(&self, booking_id: Uuid) -> BookingResult<Option<BookingEntity>> {
        let mut conn = self.conn()?;

        let booking = bookings::table
            .filter(bookings::id.eq(booking_id))
            .filter(bookings::deleted_at.is_null())
            .select(BookingEntity::as_select())
            .first::<BookingEntity>(&mut conn)
            .optional()
            .map_err(anyhow::Error::from)?;

        Ok(booking)
    }

    async fn list_bookings_by_user_id(&self, user_id: i64) -> BookingResult<Vec<BookingEntity>> {
        let mut conn = self.conn()?;

        let rows = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .filter(bookings::deleted_at.is_null())
            .order(bookings::booking_date.desc())
            .select(BookingEntity::as_select())
            .load::<BookingEntity>(&mut conn)
            .map_err(anyhow::Error::from)?;

        Ok(rows)
    }

    async fn find_payment_by_booking_id(
        &self,
        booking_id: Uuid,
    ) -> BookingResult<Option<PaymentEntity>> {
        let mut conn = self.conn()?;

        let payment = payments::table
            .filter(payments::booking_id.eq(booking_id))
            .filter(payments::deleted_at.is_null())
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()
            .map_err(anyhow::Error::from)?;

        Ok(payment)
    }

    async fn sum_held_tickets(&self, user_id: i64) -> BookingResult<i64> {
        let mut conn = self.conn()?;

        let held: Option<i64> = bookings::table
            .inner_join(payments::table)
            .filter(bookings::user_id.eq(user_id))
            .filter(bookings::deleted_at.is_null())
            .filter(payments::status.eq_any(HELD_STATUSES))
            .select(diesel::dsl::sum(bookings::total_tickets))
            .first::<Option<i64>>(&mut conn)
            .map_err(anyhow::Error::from)?;

        Ok(held.unwrap_or(0))
    }

    async fn count_pending_payments(&self, ticket_detail_id: i64) -> BookingResult<i64> {
        let mut conn = self.conn()?;

        let pending = payments::table
            .inner_join(bookings::table)
            .filter(bookings::ticket_detail_id.eq(ticket_detail_id))
            .filter(bookings::deleted_at.is_null())
            .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(anyhow::Error::from)?;

        Ok(pending)
    }

    async fn mark_payment_paid(
        &self,
        booking_id: Uuid,
        payment_method: String,
        paid_at: DateTime<Utc>,
    ) -> BookingResult<PaymentTransition> {
        self.transition(booking_id, PaymentStatus::Paid, move |payment, conn| {
            let updated = diesel::update(payments::table.find(payment.id))
                .set((
                    payments::status.eq(PaymentStatus::Paid.as_str()),
                    payments::payment_method.eq(&payment_method),
                    payments::payment_date.eq(paid_at),
                    payments::task_id.eq::<Option<String>>(None),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;
            Ok(PaymentTransition::Applied(updated))
        })
        .await
    }

    async fn mark_payment_expired(
        &self,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentTransition> {
        self.transition(booking_id, PaymentStatus::Expired, move |payment, conn| {
            // The second expiry guard: a payment whose window has not yet
            // closed stays pending even if the task fired early.
            if payment.payment_expiration >= now {
                return Ok(PaymentTransition::NotPending(payment.status.clone()));
            }
            let updated = diesel::update(payments::table.find(payment.id))
                .set((
                    payments::status.eq(PaymentStatus::Expired.as_str()),
                    payments::task_id.eq::<Option<String>>(None),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;
            Ok(PaymentTransition::Applied(updated))
        })
        .await
    }

    async fn mark_payment_cancelled(&self, booking_id: Uuid) -> BookingResult<PaymentTransition> {
        self.transition(booking_id, PaymentStatus::Cancelled, move |payment, conn| {
            let updated = diesel::update(payments::table.find(payment.id))
                .set((
                    payments::status.eq(PaymentStatus::Cancelled.as_str()),
                    payments::task_id.eq::<Option<String>>(None),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;
            Ok(PaymentTransition::Applied(updated))
        })
        .await
    }
}

impl BookingStorePostgres {
    /// Row-locked status transition towards `target`. The lock, the
    /// state-machine check and the write all happen in one transaction, so
    /// of two racing callers exactly one applies and the other observes
    /// the committed status.
    async fn transition<F>(
        &self,
        booking_id: Uuid,
        target: PaymentStatus,
        apply: F,
    ) -> BookingResult<PaymentTransition>
    where
        F: FnOnce(&PaymentEntity, &mut PgConnection) -> AnyResult<PaymentTransition>
            + Send
            + 'static,
    {
        let mut conn = self.conn()?;

        let outcome = conn.transaction::<PaymentTransition, anyhow::Error, _>(|conn| {
            let payment: Option<PaymentEntity> = payments::table
                .filter(payments::booking_id.eq(booking_id))
                .filter(payments::deleted_at.is_null())
                .select(PaymentEntity::as_select())
                .for_update()
                .first::<PaymentEntity>(conn)
                .optional()?;

            let Some(payment) = payment else {
                return Ok(PaymentTransition::NotFound);
            };

            let allowed = payment
                .payment_status()
                .is_some_and(|status| status.can_transition_to(target));
            if !allowed {
                return Ok(PaymentTransition::NotPending(payment.status.clone()));
            }

            apply(&payment, conn)
        })?;

        Ok(outcome)
    }
}
