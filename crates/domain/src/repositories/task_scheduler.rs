use async_trait::async_trait;
use mockall::automock;
use std::time::Duration;

use crate::error::BookingResult;

/// Time-deferred task queue. A task fires once after `delay`, delivered to
/// the local handler registered for its kind; the returned handle cancels
/// it while it is still pending. Cancelling an already-fired task is a
/// no-op.
#[automock]
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        delay: Duration,
    ) -> BookingResult<String>;

    async fn cancel(&self, task_id: &str) -> BookingResult<()>;
}
