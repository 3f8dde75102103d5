use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::http_gateway::circuit_breaker::CircuitBreaker;
use domain::{
    error::{BookingError, BookingResult},
    repositories::service_gateway::ServiceGateway,
    value_objects::gateway::{BaseResponse, TicketAmount, TicketStock, TokenIdentity},
};

#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub user_service_base: String,
    pub ticket_service_base: String,
    pub payment_service_endpoint: String,
}

/// Outbound HTTP client for the peer services. Every call asks the shared
/// circuit breaker first and reports its outcome back; a non-2xx response
/// is a trip signal surfaced as `BadRequest` with the upstream status in
/// the log record.
pub struct HttpServiceGateway {
    http: reqwest::Client,
    breaker: CircuitBreaker,
    endpoints: ServiceEndpoints,
}

impl HttpServiceGateway {
    pub fn new(
        breaker: CircuitBreaker,
        endpoints: ServiceEndpoints,
        timeout: Duration,
    ) -> AnyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("error building outbound http client")?;

        Ok(Self {
            http,
            breaker,
            endpoints,
        })
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        context: &'static str,
    ) -> BookingResult<reqwest::Response> {
        if !self.breaker.ready().await {
            return Err(BookingError::dependency(format!(
                "{context}: upstream circuit open"
            )));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.breaker.record_failure().await;
                return Err(BookingError::dependency(format!("{context}: {err}")));
            }
        };

        if !response.status().is_success() {
            self.breaker.record_failure().await;
            error!(status = %response.status(), "{context} failed");
            return Err(BookingError::bad_request(format!("{context} failed")));
        }

        self.breaker.record_success().await;
        Ok(response)
    }

    async fn parse_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        context: &'static str,
    ) -> BookingResult<T> {
        let envelope: BaseResponse<T> = response
            .json()
            .await
            .with_context(|| format!("{context}: malformed response envelope"))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl ServiceGateway for HttpServiceGateway {
    async fn validate_token(&self, token: &str) -> BookingResult<TokenIdentity> {
        let url = format!(
            "{}/api/private/user/validate",
            self.endpoints.user_service_base
        );
        let request = self.http.get(url).query(&[("token", token)]);

        let identity: TokenIdentity = match self.execute(request, "validate token").await {
            Ok(response) => Self::parse_envelope(response, "validate token").await?,
            // The user service answers non-2xx for a bad token; that is an
            // auth failure for our caller, not a malformed request.
            Err(BookingError::BadRequest(_)) => return Err(BookingError::Unauthorized),
            Err(err) => return Err(err),
        };

        if !identity.is_valid {
            return Err(BookingError::Unauthorized);
        }

        Ok(identity)
    }

    async fn inquiry_amount(
        &self,
        ticket_detail_id: i64,
        total_tickets: i32,
    ) -> BookingResult<TicketAmount> {
        let url = format!(
            "{}/api/private/ticket/inquiry",
            self.endpoints.ticket_service_base
        );
        let request = self.http.get(url).query(&[
            ("ticket_detail_id", ticket_detail_id.to_string()),
            ("total_ticket", total_tickets.to_string()),
        ]);

        let response = self.execute(request, "inquiry ticket amount").await?;
        Self::parse_envelope(response, "inquiry ticket amount").await
    }

    async fn submit_payment(
        &self,
        booking_id: Uuid,
        amount: Decimal,
        payment_method: &str,
        payment_date: DateTime<Utc>,
    ) -> BookingResult<()> {
        let payload = json!({
            "booking_id": booking_id,
            "amount": amount.to_f64().unwrap_or_default(),
            "payment_method": payment_method,
            "payment_date": payment_date,
        });
        let request = self
            .http
            .post(&self.endpoints.payment_service_endpoint)
            .json(&payload);

        self.execute(request, "submit payment").await?;
        Ok(())
    }

    async fn stock_lookup(&self, ticket_detail_id: i64) -> BookingResult<i64> {
        let url = format!(
            "{}/api/private/ticket/stock",
            self.endpoints.ticket_service_base
        );
        let request = self
            .http
            .get(url)
            .query(&[("ticket_detail_id", ticket_detail_id.to_string())]);

        let response = self.execute(request, "get stock ticket").await?;
        let stock: TicketStock = Self::parse_envelope(response, "get stock ticket").await?;
        Ok(stock.stock)
    }
}
