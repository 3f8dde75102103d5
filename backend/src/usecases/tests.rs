use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use domain::{
    entities::{
        bookings::BookingEntity,
        payments::{PaymentEntity, PaymentTransition},
    },
    error::BookingError,
    repositories::{
        booking_store::MockBookingStore, event_bus::MockEventBus,
        service_gateway::MockServiceGateway, stock_cache::MockStockCache,
        task_scheduler::MockTaskScheduler,
    },
    value_objects::{
        bookings::{BookTicketModel, PaymentCancelModel, PaymentModel},
        enums::payment_statuses::PaymentStatus,
        events::{
            BookTicketEvent, PaymentExpirationTask, TASK_SET_PAYMENT_EXPIRED, TOPIC_BOOK_TICKET,
            TOPIC_DECREMENT_STOCK, TOPIC_INCREMENT_STOCK, TOPIC_NOTIFICATION,
        },
        gateway::TicketAmount,
    },
};

use super::bookings::BookingUseCase;

const USER_ID: i64 = 77;
const TICKET_DETAIL_ID: i64 = 42;

struct Mocks {
    store: MockBookingStore,
    stock_cache: MockStockCache,
    gateway: MockServiceGateway,
    bus: MockEventBus,
    scheduler: MockTaskScheduler,
}

impl Mocks {
    fn new() -> Self {
        Self {
            store: MockBookingStore::new(),
            stock_cache: MockStockCache::new(),
            gateway: MockServiceGateway::new(),
            bus: MockEventBus::new(),
            scheduler: MockTaskScheduler::new(),
        }
    }

    fn into_usecase(self) -> BookingUseCase {
        BookingUseCase::new(
            Arc::new(self.store),
            Arc::new(self.stock_cache),
            Arc::new(self.gateway),
            Arc::new(self.bus),
            Arc::new(self.scheduler),
        )
    }
}

fn book_payload() -> BookTicketModel {
    BookTicketModel {
        ticket_detail_id: TICKET_DETAIL_ID,
        total_tickets: 1,
        full_name: "Ada Lovelace".to_string(),
        personal_id: "3175012345678901".to_string(),
    }
}

fn book_event() -> BookTicketEvent {
    BookTicketEvent {
        ticket_detail_id: TICKET_DETAIL_ID,
        total_tickets: 1,
        user_id: USER_ID,
        full_name: "Ada Lovelace".to_string(),
        personal_id: "3175012345678901".to_string(),
    }
}

fn ticket_amount() -> TicketAmount {
    TicketAmount {
        total_ticket: 1,
        total_amount: Decimal::new(150_000, 0),
        currency: "IDR".to_string(),
    }
}

fn payment_with_status(booking_id: Uuid, status: PaymentStatus) -> PaymentEntity {
    let now = Utc::now();
    PaymentEntity {
        id: 1,
        booking_id,
        amount: Decimal::new(150_000, 0),
        currency: "IDR".to_string(),
        status: status.as_str().to_string(),
        payment_method: String::new(),
        payment_date: now,
        payment_expiration: now + Duration::minutes(30),
        task_id: Some("task-1".to_string()),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn booking_entity(booking_id: Uuid, user_id: i64) -> BookingEntity {
    let now = Utc::now();
    BookingEntity {
        id: booking_id,
        user_id,
        ticket_detail_id: TICKET_DETAIL_ID,
        total_tickets: 1,
        full_name: "Ada Lovelace".to_string(),
        personal_id: "3175012345678901".to_string(),
        booking_date: now,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn assert_bad_request(err: BookingError, expected: &str) {
    match err {
        BookingError::BadRequest(message) => assert_eq!(message, expected),
        other => panic!("expected BadRequest({expected}), got {other:?}"),
    }
}

mod admission {
    use super::*;

    #[tokio::test]
    async fn rejects_when_stock_is_empty() {
        let mut mocks = Mocks::new();
        mocks
            .stock_cache
            .expect_check()
            .returning(|_| Ok(0));
        mocks.bus.expect_publish().times(0);

        let err = mocks
            .into_usecase()
            .book_ticket(&book_payload(), USER_ID, "ada@example.com")
            .await
            .unwrap_err();

        assert_bad_request(err, "stock empty");
    }

    #[tokio::test]
    async fn rejects_when_quota_is_spent() {
        let mut mocks = Mocks::new();
        mocks.stock_cache.expect_check().returning(|_| Ok(10));
        mocks
            .store
            .expect_sum_held_tickets()
            .withf(|user_id| *user_id == USER_ID)
            .returning(|_| Ok(2));
        mocks.bus.expect_publish().times(0);

        let err = mocks
            .into_usecase()
            .book_ticket(&book_payload(), USER_ID, "ada@example.com")
            .await
            .unwrap_err();

        assert_bad_request(err, "quota exceeded");
    }

    #[tokio::test]
    async fn rejects_non_positive_ticket_counts() {
        let mocks = Mocks::new();
        let mut payload = book_payload();
        payload.total_tickets = 0;

        let err = mocks
            .into_usecase()
            .book_ticket(&payload, USER_ID, "ada@example.com")
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::BadRequest(_)));
    }

    #[tokio::test]
    async fn queues_the_reservation_and_notifies() {
        let mut mocks = Mocks::new();
        mocks.stock_cache.expect_check().returning(|_| Ok(3));
        mocks.store.expect_sum_held_tickets().returning(|_| Ok(1));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, message| {
                if topic != TOPIC_BOOK_TICKET {
                    return false;
                }
                let event: BookTicketEvent = serde_json::from_slice(&message.payload).unwrap();
                event.user_id == USER_ID && event.ticket_detail_id == TICKET_DETAIL_ID
            })
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_NOTIFICATION)
            .times(1)
            .returning(|_, _| Ok(()));

        mocks
            .into_usecase()
            .book_ticket(&book_payload(), USER_ID, "ada@example.com")
            .await
            .unwrap();
    }
}

mod allocation {
    use super::*;

    #[tokio::test]
    async fn holds_the_seat_and_creates_a_pending_payment() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks.stock_cache.expect_check().returning(|_| Ok(1));
        mocks
            .stock_cache
            .expect_decrement()
            .withf(|ticket_detail_id| *ticket_detail_id == TICKET_DETAIL_ID)
            .times(1)
            .returning(|_| Ok(()));
        mocks.stock_cache.expect_increment().times(0);

        mocks
            .store
            .expect_upsert_booking()
            .withf(|booking| booking.id.is_none() && booking.user_id == USER_ID)
            .times(1)
            .returning(move |_| Ok(booking_id));
        mocks
            .gateway
            .expect_inquiry_amount()
            .returning(|_, _| Ok(ticket_amount()));
        mocks
            .scheduler
            .expect_enqueue()
            .withf(move |kind, payload, delay| {
                let task: PaymentExpirationTask =
                    serde_json::from_value(payload.clone()).unwrap();
                kind == TASK_SET_PAYMENT_EXPIRED
                    && task.booking_id == booking_id
                    && *delay == StdDuration::from_secs(30 * 60)
            })
            .times(1)
            .returning(|_, _, _| Ok("task-1".to_string()));
        mocks
            .store
            .expect_upsert_payment()
            .withf(move |payment| {
                payment.booking_id == booking_id
                    && payment.status == PaymentStatus::Pending
                    && payment.amount == Decimal::new(150_000, 0)
                    && payment.currency == "IDR"
                    && payment.task_id.as_deref() == Some("task-1")
                    && payment.payment_expiration > payment.payment_date
            })
            .times(1)
            .returning(|_| Ok(()));

        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_DECREMENT_STOCK)
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_NOTIFICATION)
            .times(1)
            .returning(|_, _| Ok(()));

        mocks
            .into_usecase()
            .consume_book_ticket(&book_event())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fails_without_reserving_when_stock_is_exhausted() {
        let mut mocks = Mocks::new();
        mocks.stock_cache.expect_check().returning(|_| Ok(0));
        mocks.stock_cache.expect_decrement().times(0);

        let err = mocks
            .into_usecase()
            .consume_book_ticket(&book_event())
            .await
            .unwrap_err();

        assert_bad_request(err, "stock empty");
    }

    #[tokio::test]
    async fn restores_the_counter_when_the_amount_inquiry_fails() {
        let mut mocks = Mocks::new();
        mocks.stock_cache.expect_check().returning(|_| Ok(1));
        mocks.stock_cache.expect_decrement().returning(|_| Ok(()));
        mocks
            .store
            .expect_upsert_booking()
            .returning(|_| Ok(Uuid::new_v4()));
        mocks
            .gateway
            .expect_inquiry_amount()
            .returning(|_, _| Err(BookingError::dependency("inquiry ticket amount: circuit open")));
        mocks
            .stock_cache
            .expect_increment()
            .withf(|ticket_detail_id| *ticket_detail_id == TICKET_DETAIL_ID)
            .times(1)
            .returning(|_| Ok(()));
        mocks.scheduler.expect_enqueue().times(0);
        mocks.store.expect_upsert_payment().times(0);

        let err = mocks
            .into_usecase()
            .consume_book_ticket(&book_event())
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::Dependency(_)));
    }

    #[tokio::test]
    async fn cancels_the_enqueued_task_when_the_payment_upsert_fails() {
        let mut mocks = Mocks::new();
        mocks.stock_cache.expect_check().returning(|_| Ok(1));
        mocks.stock_cache.expect_decrement().returning(|_| Ok(()));
        mocks
            .store
            .expect_upsert_booking()
            .returning(|_| Ok(Uuid::new_v4()));
        mocks
            .gateway
            .expect_inquiry_amount()
            .returning(|_, _| Ok(ticket_amount()));
        mocks
            .scheduler
            .expect_enqueue()
            .returning(|_, _, _| Ok("task-9".to_string()));
        mocks
            .store
            .expect_upsert_payment()
            .returning(|_| Err(BookingError::Internal(anyhow::anyhow!("db down"))));
        mocks
            .scheduler
            .expect_cancel()
            .withf(|task_id| task_id == "task-9")
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .stock_cache
            .expect_increment()
            .times(1)
            .returning(|_| Ok(()));

        let err = mocks
            .into_usecase()
            .consume_book_ticket(&book_event())
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::Internal(_)));
    }
}

mod settlement {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_bookings() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(|_| Ok(None));
        mocks.gateway.expect_submit_payment().times(0);

        let err = mocks
            .into_usecase()
            .payment(&PaymentModel {
                booking_id,
                payment_method: "card".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_payments_that_already_reached_a_terminal_state() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(move |_| Ok(Some(payment_with_status(booking_id, PaymentStatus::Expired))));
        mocks.gateway.expect_submit_payment().times(0);

        let err = mocks
            .into_usecase()
            .payment(&PaymentModel {
                booking_id,
                payment_method: "card".to_string(),
            })
            .await
            .unwrap_err();

        assert_bad_request(err, "already settled");
    }

    #[tokio::test]
    async fn settles_cancels_the_expiry_task_and_publishes_the_final_decrement() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(move |_| Ok(Some(payment_with_status(booking_id, PaymentStatus::Pending))));
        mocks
            .gateway
            .expect_submit_payment()
            .withf(move |id, amount, method, _| {
                *id == booking_id && *amount == Decimal::new(150_000, 0) && method == "card"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        mocks
            .store
            .expect_mark_payment_paid()
            .withf(move |id, method, _| *id == booking_id && method == "card")
            .times(1)
            .returning(move |id, method, paid_at| {
                let mut paid = payment_with_status(id, PaymentStatus::Paid);
                paid.payment_method = method;
                paid.payment_date = paid_at;
                paid.task_id = None;
                Ok(PaymentTransition::Applied(paid))
            });
        mocks
            .scheduler
            .expect_cancel()
            .withf(|task_id| task_id == "task-1")
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .store
            .expect_find_booking_by_id()
            .returning(move |id| Ok(Some(booking_entity(id, USER_ID))));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_DECREMENT_STOCK)
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_NOTIFICATION)
            .times(1)
            .returning(|_, _| Ok(()));

        mocks
            .into_usecase()
            .payment(&PaymentModel {
                booking_id,
                payment_method: "card".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn race_loser_observes_the_committed_status_and_noops() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(move |_| Ok(Some(payment_with_status(booking_id, PaymentStatus::Pending))));
        mocks
            .gateway
            .expect_submit_payment()
            .returning(|_, _, _, _| Ok(()));
        // The expiry task committed first; this settlement lost the race.
        mocks
            .store
            .expect_mark_payment_paid()
            .returning(|_, _, _| {
                Ok(PaymentTransition::NotPending("expired".to_string()))
            });
        mocks.scheduler.expect_cancel().times(0);
        mocks.bus.expect_publish().times(0);

        let err = mocks
            .into_usecase()
            .payment(&PaymentModel {
                booking_id,
                payment_method: "card".to_string(),
            })
            .await
            .unwrap_err();

        assert_bad_request(err, "already settled");
    }
}

mod expiration {
    use super::*;

    fn expiry_task(booking_id: Uuid) -> PaymentExpirationTask {
        PaymentExpirationTask {
            booking_id,
            ticket_detail_id: TICKET_DETAIL_ID,
            total_tickets: 1,
        }
    }

    #[tokio::test]
    async fn expires_a_pending_payment_and_restores_inventory() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_mark_payment_expired()
            .withf(move |id, _| *id == booking_id)
            .times(1)
            .returning(|id, _| {
                Ok(PaymentTransition::Applied(payment_with_status(
                    id,
                    PaymentStatus::Expired,
                )))
            });
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_INCREMENT_STOCK)
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .stock_cache
            .expect_increment()
            .withf(|ticket_detail_id| *ticket_detail_id == TICKET_DETAIL_ID)
            .times(1)
            .returning(|_| Ok(()));

        mocks
            .into_usecase()
            .set_payment_expired(&expiry_task(booking_id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn is_a_noop_once_the_payment_was_settled() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_mark_payment_expired()
            .returning(|_, _| Ok(PaymentTransition::NotPending("paid".to_string())));
        mocks.bus.expect_publish().times(0);
        mocks.stock_cache.expect_increment().times(0);

        mocks
            .into_usecase()
            .set_payment_expired(&expiry_task(booking_id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn is_a_noop_for_vanished_payments() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_mark_payment_expired()
            .returning(|_, _| Ok(PaymentTransition::NotFound));
        mocks.bus.expect_publish().times(0);

        mocks
            .into_usecase()
            .set_payment_expired(&expiry_task(booking_id))
            .await
            .unwrap();
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancels_a_pending_booking_and_restores_inventory() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_find_booking_by_id()
            .returning(move |id| Ok(Some(booking_entity(id, USER_ID))));
        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(move |_| Ok(Some(payment_with_status(booking_id, PaymentStatus::Pending))));
        mocks
            .store
            .expect_mark_payment_cancelled()
            .times(1)
            .returning(|id| {
                Ok(PaymentTransition::Applied(payment_with_status(
                    id,
                    PaymentStatus::Cancelled,
                )))
            });
        mocks
            .scheduler
            .expect_cancel()
            .withf(|task_id| task_id == "task-1")
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_INCREMENT_STOCK)
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bus
            .expect_publish()
            .withf(|topic, _| topic == TOPIC_NOTIFICATION)
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .stock_cache
            .expect_increment()
            .times(1)
            .returning(|_| Ok(()));

        mocks
            .into_usecase()
            .payment_cancel(&PaymentCancelModel { booking_id }, USER_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hides_bookings_that_belong_to_someone_else() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .store
            .expect_find_booking_by_id()
            .returning(move |id| Ok(Some(booking_entity(id, USER_ID + 1))));
        mocks.store.expect_mark_payment_cancelled().times(0);

        let err = mocks
            .into_usecase()
            .payment_cancel(&PaymentCancelModel { booking_id }, USER_ID)
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::NotFound(_)));
    }
}

mod read_paths {
    use super::*;

    #[tokio::test]
    async fn show_bookings_is_not_found_for_users_without_bookings() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_list_bookings_by_user_id()
            .returning(|_| Ok(Vec::new()));

        let err = mocks
            .into_usecase()
            .show_bookings(USER_ID)
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn show_bookings_joins_each_booking_with_its_payment() {
        let booking_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_list_bookings_by_user_id()
            .returning(move |_| Ok(vec![booking_entity(booking_id, USER_ID)]));
        mocks
            .store
            .expect_find_payment_by_booking_id()
            .returning(move |_| Ok(Some(payment_with_status(booking_id, PaymentStatus::Pending))));

        let booked = mocks.into_usecase().show_bookings(USER_ID).await.unwrap();

        assert_eq!(booked.len(), 1);
        assert_eq!(booked[0].id, booking_id);
        assert_eq!(booked[0].status, "pending");
        assert_eq!(booked[0].total_amount, 150_000.0);
    }

    #[tokio::test]
    async fn pending_payment_count_passes_through() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_count_pending_payments()
            .withf(|ticket_detail_id| *ticket_detail_id == TICKET_DETAIL_ID)
            .returning(|_| Ok(4));

        let dto = mocks
            .into_usecase()
            .count_pending_payment(TICKET_DETAIL_ID)
            .await
            .unwrap();

        assert_eq!(dto.pending_payments, 4);
    }
}
