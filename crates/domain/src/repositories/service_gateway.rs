use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BookingResult;
use crate::value_objects::gateway::{TicketAmount, TokenIdentity};

/// Outbound calls to the peer services (user, ticket, payment), every one
/// gated by the shared circuit breaker. An open circuit fails fast with
/// `Dependency`; a non-2xx response surfaces as `BadRequest` and counts as
/// a trip signal.
#[automock]
#[async_trait]
pub trait ServiceGateway: Send + Sync {
    async fn validate_token(&self, token: &str) -> BookingResult<TokenIdentity>;

    async fn inquiry_amount(
        &self,
        ticket_detail_id: i64,
        total_tickets: i32,
    ) -> BookingResult<TicketAmount>;

    async fn submit_payment(
        &self,
        booking_id: Uuid,
        amount: Decimal,
        payment_method: &str,
        payment_date: DateTime<Utc>,
    ) -> BookingResult<()>;

    /// Authoritative stock read, used to seed the cache on a miss.
    async fn stock_lookup(&self, ticket_detail_id: i64) -> BookingResult<i64>;
}
