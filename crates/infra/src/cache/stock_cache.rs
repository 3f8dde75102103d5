use anyhow::Context;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::sync::Arc;
use tracing::debug;

use domain::{
    error::BookingResult,
    repositories::{service_gateway::ServiceGateway, stock_cache::StockCache},
};

/// Cache-aside stock counters. The key is the decimal ticket-detail id,
/// the value a plain integer, stored without expiration; the ticket
/// service stays authoritative and reseeds the counter on a miss.
pub struct StockCacheRedis {
    conn_manager: ConnectionManager,
    gateway: Arc<dyn ServiceGateway>,
}

impl StockCacheRedis {
    pub fn new(conn_manager: ConnectionManager, gateway: Arc<dyn ServiceGateway>) -> Self {
        Self {
            conn_manager,
            gateway,
        }
    }

    fn stock_key(ticket_detail_id: i64) -> String {
        ticket_detail_id.to_string()
    }
}

#[async_trait]
impl StockCache for StockCacheRedis {
    async fn check(&self, ticket_detail_id: i64) -> BookingResult<i64> {
        let key = Self::stock_key(ticket_detail_id);
        let mut conn = self.conn_manager.clone();

        let cached: Option<i64> = conn
            .get(&key)
            .await
            .context("error reading stock counter")?;

        if let Some(stock) = cached {
            return Ok(stock);
        }

        // Miss: authoritative read through the gateway, then seed the
        // counter. A circuit-open gateway bubbles up as Dependency.
        let stock = self.gateway.stock_lookup(ticket_detail_id).await?;

        let _: () = conn
            .set(&key, stock)
            .await
            .context("error seeding stock counter")?;

        debug!(ticket_detail_id, stock, "stock counter seeded from ticket service");
        Ok(stock)
    }

    async fn decrement(&self, ticket_detail_id: i64) -> BookingResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .decr(Self::stock_key(ticket_detail_id), 1)
            .await
            .context("error decrementing stock counter")?;
        Ok(())
    }

    async fn increment(&self, ticket_detail_id: i64) -> BookingResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .incr(Self::stock_key(ticket_detail_id), 1)
            .await
            .context("error incrementing stock counter")?;
        Ok(())
    }
}
