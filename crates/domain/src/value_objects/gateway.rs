use rust_decimal::Decimal;
use serde::Deserialize;

/// Common envelope the peer services wrap their responses in.
#[derive(Debug, Deserialize)]
pub struct BaseResponse<T> {
    pub data: T,
}

/// `GET /api/private/user/validate` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenIdentity {
    pub is_valid: bool,
    pub user_id: i64,
    pub email_user: String,
}

/// `GET /api/private/ticket/inquiry` response body. The currency is the
/// ticket's and stays with the payment for its whole lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketAmount {
    pub total_ticket: i32,
    pub total_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "IDR".to_string()
}

/// `GET /api/private/ticket/stock` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketStock {
    pub stock: i64,
}
