use async_trait::async_trait;
use mockall::automock;

use crate::error::BookingResult;

/// Cache-aside stock counter per ticket detail. The cached value mirrors
/// `true_stock - seats held`; the ticket service remains authoritative and
/// repopulates the counter on a miss.
#[automock]
#[async_trait]
pub trait StockCache: Send + Sync {
    /// Cached counter, seeding from the authoritative read on a miss.
    async fn check(&self, ticket_detail_id: i64) -> BookingResult<i64>;

    /// Atomic decrement. The resulting sign is not checked; going negative
    /// under race is expected and compensated by the orchestrator.
    async fn decrement(&self, ticket_detail_id: i64) -> BookingResult<()>;

    /// Atomic increment, used for compensation.
    async fn increment(&self, ticket_detail_id: i64) -> BookingResult<()>;
}
