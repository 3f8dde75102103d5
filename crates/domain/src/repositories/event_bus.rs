use async_trait::async_trait;
use mockall::automock;

use crate::error::BookingResult;
use crate::value_objects::events::OutboundMessage;

/// Durable publish side of the bus. Delivery is at-least-once; consumers
/// dedupe on the message id.
#[automock]
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> BookingResult<()>;
}
