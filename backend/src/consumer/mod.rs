use anyhow::Result;
use std::sync::Arc;

use crate::usecases::bookings::BookingUseCase;
use domain::{
    error::BookingError,
    value_objects::events::{BookTicketEvent, TOPIC_BOOK_TICKET},
};
use infra::messaging::amqp::{AmqpEventBus, ConsumerRegistration, InboundMessage};

/// Binds the allocation handler to the `book_ticket` queue. A handler
/// error nacks the delivery into the retry/poison flow; the orchestrator
/// has already compensated its cache decrement by then.
pub async fn run_book_ticket_consumer(
    bus: Arc<AmqpEventBus>,
    usecase: Arc<BookingUseCase>,
) -> Result<()> {
    let registration = ConsumerRegistration::for_topic(TOPIC_BOOK_TICKET);

    bus.run_consumer(registration, move |message: InboundMessage| {
        let usecase = Arc::clone(&usecase);
        async move {
            let event: BookTicketEvent = serde_json::from_slice(&message.payload)
                .map_err(|err| BookingError::Internal(err.into()))?;
            usecase.consume_book_ticket(&event).await
        }
    })
    .await
}
