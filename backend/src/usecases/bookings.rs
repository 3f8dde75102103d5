use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use domain::{
    entities::{
        bookings::UpsertBookingEntity,
        payments::{PaymentTransition, UpsertPaymentEntity},
    },
    error::{BookingError, BookingResult},
    repositories::{
        booking_store::BookingStore, event_bus::EventBus, service_gateway::ServiceGateway,
        stock_cache::StockCache, task_scheduler::TaskScheduler,
    },
    value_objects::{
        bookings::{BookTicketModel, BookedTicketDto, PaymentCancelModel, PaymentModel,
            PendingPaymentCountDto},
        enums::payment_statuses::PaymentStatus,
        events::{
            BookTicketEvent, NotificationEvent, OutboundMessage, PaymentExpirationTask,
            StockDeltaEvent, TASK_SET_PAYMENT_EXPIRED, TOPIC_BOOK_TICKET, TOPIC_DECREMENT_STOCK,
            TOPIC_INCREMENT_STOCK, TOPIC_NOTIFICATION,
        },
    },
};

/// A user may hold at most this many seats across live bookings.
const MAX_TICKETS_PER_USER: i64 = 2;

/// Window a pending booking may be settled in before auto-expiration.
const PAYMENT_WINDOW_MINUTES: i64 = 30;

/// The booking orchestrator: admission, allocation, payment settlement,
/// expiration and cancellation, plus the read paths. Admission is advisory
/// and cheap; the allocation consumer is the authority that actually holds
/// seats, and every terminal payment transition goes through a row-locked
/// compare-and-set in the store.
pub struct BookingUseCase {
    store: Arc<dyn BookingStore>,
    stock_cache: Arc<dyn StockCache>,
    gateway: Arc<dyn ServiceGateway>,
    bus: Arc<dyn EventBus>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl BookingUseCase {
    pub fn new(
        store: Arc<dyn BookingStore>,
        stock_cache: Arc<dyn StockCache>,
        gateway: Arc<dyn ServiceGateway>,
        bus: Arc<dyn EventBus>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            store,
            stock_cache,
            gateway,
            bus,
            scheduler,
        }
    }

    /// Synchronous admission. Sheds obviously-bad traffic (no stock, quota
    /// already spent) without holding any DB lock, then queues the real
    /// reservation for the consumer.
    pub async fn book_ticket(
        &self,
        payload: &BookTicketModel,
        user_id: i64,
        email_user: &str,
    ) -> BookingResult<()> {
        if payload.total_tickets < 1 {
            return Err(BookingError::bad_request("total tickets must be at least 1"));
        }

        let stock = self.stock_cache.check(payload.ticket_detail_id).await?;
        if stock <= 0 {
            return Err(BookingError::bad_request("stock empty"));
        }

        let held = self.store.sum_held_tickets(user_id).await?;
        if held >= MAX_TICKETS_PER_USER {
            return Err(BookingError::bad_request("quota exceeded"));
        }

        let event = BookTicketEvent {
            ticket_detail_id: payload.ticket_detail_id,
            total_tickets: payload.total_tickets,
            user_id,
            full_name: payload.full_name.clone(),
            personal_id: payload.personal_id.clone(),
        };
        self.bus
            .publish(TOPIC_BOOK_TICKET, OutboundMessage::json(&event)?)
            .await?;

        self.notify("your ticket has been queued").await;

        info!(
            user_id,
            email_user,
            ticket_detail_id = payload.ticket_detail_id,
            total_tickets = payload.total_tickets,
            "booking admitted and queued"
        );

        Ok(())
    }

    /// Allocation: the `book_ticket` consumer. Re-checks stock, reserves
    /// the slot in the cache, and persists booking + pending payment. Any
    /// failure after the decrement restores the counter before the message
    /// nacks, so a retried delivery starts from a clean slate.
    pub async fn consume_book_ticket(&self, event: &BookTicketEvent) -> BookingResult<()> {
        let stock = self.stock_cache.check(event.ticket_detail_id).await?;
        if stock <= 0 {
            return Err(BookingError::bad_request("stock empty"));
        }

        self.stock_cache.decrement(event.ticket_detail_id).await?;

        if let Err(err) = self.allocate(event).await {
            if let Err(comp_err) = self.stock_cache.increment(event.ticket_detail_id).await {
                error!(%comp_err, ticket_detail_id = event.ticket_detail_id,
                    "error restoring stock counter after failed allocation");
            }
            return Err(err);
        }

        Ok(())
    }

    async fn allocate(&self, event: &BookTicketEvent) -> BookingResult<()> {
        let now = Utc::now();

        let booking_id = self
            .store
            .upsert_booking(UpsertBookingEntity {
                id: None,
                user_id: event.user_id,
                ticket_detail_id: event.ticket_detail_id,
                total_tickets: event.total_tickets,
                full_name: event.full_name.clone(),
                personal_id: event.personal_id.clone(),
                booking_date: now,
            })
            .await?;

        let amount = self
            .gateway
            .inquiry_amount(event.ticket_detail_id, event.total_tickets)
            .await?;

        let payment_expiration = now + Duration::minutes(PAYMENT_WINDOW_MINUTES);

        // Enqueue before the payment row is written so every committed
        // pending payment already carries the task guarding it. The
        // failure path below cancels the task again.
        let task_payload = serde_json::to_value(PaymentExpirationTask {
            booking_id,
            ticket_detail_id: event.ticket_detail_id,
            total_tickets: event.total_tickets,
        })
        .map_err(anyhow::Error::from)?;
        let delay = (payment_expiration - now)
            .to_std()
            .map_err(anyhow::Error::from)?;
        let task_id = self
            .scheduler
            .enqueue(TASK_SET_PAYMENT_EXPIRED, task_payload, delay)
            .await?;

        let upsert = UpsertPaymentEntity {
            booking_id,
            amount: amount.total_amount,
            currency: amount.currency.clone(),
            status: PaymentStatus::Pending,
            payment_method: String::new(),
            payment_date: now,
            payment_expiration,
            task_id: Some(task_id.clone()),
        };
        if let Err(err) = self.store.upsert_payment(upsert).await {
            if let Err(cancel_err) = self.scheduler.cancel(&task_id).await {
                error!(%cancel_err, task_id, "error cancelling expiry task after failed upsert");
            }
            return Err(err);
        }

        self.publish_stock_delta(TOPIC_DECREMENT_STOCK, event.ticket_detail_id, event.total_tickets)
            .await;
        self.notify("your ticket has been queued").await;

        info!(
            %booking_id,
            user_id = event.user_id,
            ticket_detail_id = event.ticket_detail_id,
            "booking allocated with pending payment"
        );

        Ok(())
    }

    /// Settlement. Submits the capture to the payment service, then moves
    /// the payment to `paid` through the row-locked transition; a racing
    /// expiry that committed first is reported back as already settled.
    pub async fn payment(&self, payload: &PaymentModel) -> BookingResult<()> {
        let payment = self
            .store
            .find_payment_by_booking_id(payload.booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment not found"))?;

        if payment
            .payment_status()
            .map_or(true, |status| status.is_terminal())
        {
            return Err(BookingError::bad_request("already settled"));
        }

        let now = Utc::now();
        self.gateway
            .submit_payment(
                payload.booking_id,
                payment.amount,
                &payload.payment_method,
                now,
            )
            .await?;

        let paid = match self
            .store
            .mark_payment_paid(payload.booking_id, payload.payment_method.clone(), now)
            .await?
        {
            PaymentTransition::Applied(paid) => paid,
            PaymentTransition::NotPending(_) => {
                return Err(BookingError::bad_request("already settled"));
            }
            PaymentTransition::NotFound => {
                return Err(BookingError::not_found("payment not found"));
            }
        };

        // Best effort: a task that already fired lost the race anyway and
        // its guard sees a paid payment.
        if let Some(task_id) = payment.task_id.as_deref() {
            if let Err(err) = self.scheduler.cancel(task_id).await {
                warn!(%err, task_id, "error cancelling expiry task after settlement");
            }
        }

        let booking = self
            .store
            .find_booking_by_id(payload.booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking not found"))?;

        self.publish_stock_delta(
            TOPIC_DECREMENT_STOCK,
            booking.ticket_detail_id,
            booking.total_tickets,
        )
        .await;
        self.notify("your payment has been paid").await;

        info!(booking_id = %paid.booking_id, "payment settled");

        Ok(())
    }

    /// User-initiated cancellation of a pending booking. Same shape as
    /// expiration, minus the time guard.
    pub async fn payment_cancel(
        &self,
        payload: &PaymentCancelModel,
        user_id: i64,
    ) -> BookingResult<()> {
        let booking = self
            .store
            .find_booking_by_id(payload.booking_id)
            .await?
            .filter(|booking| booking.user_id == user_id)
            .ok_or_else(|| BookingError::not_found("booking not found"))?;

        let payment = self
            .store
            .find_payment_by_booking_id(payload.booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment not found"))?;

        match self.store.mark_payment_cancelled(payload.booking_id).await? {
            PaymentTransition::Applied(_) => {}
            PaymentTransition::NotPending(_) => {
                return Err(BookingError::bad_request("already settled"));
            }
            PaymentTransition::NotFound => {
                return Err(BookingError::not_found("payment not found"));
            }
        }

        if let Some(task_id) = payment.task_id.as_deref() {
            if let Err(err) = self.scheduler.cancel(task_id).await {
                warn!(%err, task_id, "error cancelling expiry task after cancellation");
            }
        }

        self.restore_stock(booking.ticket_detail_id, booking.total_tickets)
            .await;
        self.notify("your booking has been cancelled").await;

        info!(booking_id = %payload.booking_id, user_id, "booking cancelled");

        Ok(())
    }

    /// Expiry task handler. The transition applies only while the payment
    /// is still pending with its window closed; both guards and the write
    /// share one transaction, so a settlement that committed first turns
    /// this into a clean no-op.
    pub async fn set_payment_expired(&self, task: &PaymentExpirationTask) -> BookingResult<()> {
        match self
            .store
            .mark_payment_expired(task.booking_id, Utc::now())
            .await?
        {
            PaymentTransition::Applied(_) => {
                self.restore_stock(task.ticket_detail_id, task.total_tickets)
                    .await;
                info!(booking_id = %task.booking_id, "pending payment expired");
                Ok(())
            }
            // Guard rejected: paid/cancelled meanwhile, or the window is
            // still open. Success, not failure, so the task is not retried.
            PaymentTransition::NotPending(_) | PaymentTransition::NotFound => Ok(()),
        }
    }

    pub async fn show_bookings(&self, user_id: i64) -> BookingResult<Vec<BookedTicketDto>> {
        let bookings = self.store.list_bookings_by_user_id(user_id).await?;
        if bookings.is_empty() {
            return Err(BookingError::not_found("booking not found"));
        }

        let mut booked = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if let Some(payment) = self.store.find_payment_by_booking_id(booking.id).await? {
                booked.push(BookedTicketDto::from_entities(booking, payment));
            }
        }

        Ok(booked)
    }

    pub async fn count_pending_payment(
        &self,
        ticket_detail_id: i64,
    ) -> BookingResult<PendingPaymentCountDto> {
        let pending_payments = self.store.count_pending_payments(ticket_detail_id).await?;
        Ok(PendingPaymentCountDto {
            ticket_detail_id,
            pending_payments,
        })
    }

    /// Inventory restoration shared by expiration and cancellation: the
    /// authoritative increment event for the ticket service plus the local
    /// counter. Both are best effort; the cache reseeds itself on a miss.
    async fn restore_stock(&self, ticket_detail_id: i64, total_tickets: i32) {
        self.publish_stock_delta(TOPIC_INCREMENT_STOCK, ticket_detail_id, total_tickets)
            .await;
        if let Err(err) = self.stock_cache.increment(ticket_detail_id).await {
            error!(%err, ticket_detail_id, "error restoring stock counter");
        }
    }

    /// Post-commit events never fail the operation that produced them; the
    /// committed row is the source of truth and the bus is at-least-once.
    async fn publish_stock_delta(&self, topic: &str, ticket_detail_id: i64, total_tickets: i32) {
        let event = StockDeltaEvent {
            ticket_detail_id,
            total_tickets,
        };
        match OutboundMessage::json(&event) {
            Ok(message) => {
                if let Err(err) = self.bus.publish(topic, message).await {
                    error!(%err, topic, ticket_detail_id, "error publishing stock delta");
                }
            }
            Err(err) => error!(%err, topic, "error encoding stock delta"),
        }
    }

    async fn notify(&self, message: &str) {
        let event = NotificationEvent {
            message: message.to_string(),
        };
        match OutboundMessage::json(&event) {
            Ok(outbound) => {
                if let Err(err) = self.bus.publish(TOPIC_NOTIFICATION, outbound).await {
                    warn!(%err, "error publishing notification");
                }
            }
            Err(err) => warn!(%err, "error encoding notification"),
        }
    }
}
