use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOPIC_BOOK_TICKET: &str = "book_ticket";
pub const TOPIC_DECREMENT_STOCK: &str = "decrement_stock_ticket";
pub const TOPIC_INCREMENT_STOCK: &str = "increment_stock_ticket";
pub const TOPIC_NOTIFICATION: &str = "notification";

/// Suffix appended to an input topic to name its poison queue.
pub const POISONED_SUFFIX: &str = "_poisoned";

/// A message on its way to the bus. Every message carries an opaque unique
/// id so consumers can deduplicate under at-least-once delivery.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn json<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            payload: serde_json::to_vec(payload)?,
        })
    }
}

/// Payload of `book_ticket`: the admitted reservation request, queued for
/// the allocation consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTicketEvent {
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
    pub user_id: i64,
    pub full_name: String,
    pub personal_id: String,
}

/// Payload of `decrement_stock_ticket` / `increment_stock_ticket`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDeltaEvent {
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub message: String,
}

/// Payload handed to the delay scheduler for the payment-expiry task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentExpirationTask {
    pub booking_id: Uuid,
    pub ticket_detail_id: i64,
    pub total_tickets: i32,
}

/// Task kind the expiry handler registers under.
pub const TASK_SET_PAYMENT_EXPIRED: &str = "set_payment_expired";
