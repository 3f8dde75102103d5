use anyhow::{Context, Result as AnyResult, anyhow};
use async_trait::async_trait;
use futures::future::BoxFuture;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::{error::BookingResult, repositories::task_scheduler::TaskScheduler};

/// Sorted set of pending task ids, scored by unix fire time.
const DUE_SET: &str = "scheduler:due";

/// Attempts a fired task gets before it is dropped.
const MAX_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF: Duration = Duration::from_secs(5);

const CLAIM_BATCH: isize = 16;

fn task_key(task_id: &str) -> String {
    format!("scheduler:task:{task_id}")
}

/// Client half of the delay queue: persists a deferred task and hands back
/// a stable handle. `cancel` is client-side removal; once a worker has
/// claimed the task the handle no longer matches anything and cancel is a
/// no-op.
pub struct RedisTaskScheduler {
    conn_manager: ConnectionManager,
}

impl RedisTaskScheduler {
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl TaskScheduler for RedisTaskScheduler {
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        delay: Duration,
    ) -> BookingResult<String> {
        let task_id = Uuid::new_v4().to_string();
        let fire_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;
        let mut conn = self.conn_manager.clone();

        let fields = [
            ("kind", kind.to_string()),
            ("payload", payload.to_string()),
            // Per-task timeout inherits the originally requested delay.
            ("timeout_secs", delay.as_secs().to_string()),
            ("attempts", "0".to_string()),
        ];

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(task_key(&task_id), &fields)
            .zadd(DUE_SET, &task_id, fire_at);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("error enqueueing scheduled task")?;

        Ok(task_id)
    }

    async fn cancel(&self, task_id: &str) -> BookingResult<()> {
        let mut conn = self.conn_manager.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(DUE_SET, task_id)
            .del(task_key(task_id));
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("error cancelling scheduled task")?;

        Ok(())
    }
}

type TaskHandler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, BookingResult<()>> + Send + Sync>;

/// Fire loop of the delay queue. Polls for due task ids, claims each with
/// a single `ZREM` (one claimer wins across workers) and dispatches it to
/// the handler registered for its kind.
pub struct SchedulerWorker {
    conn_manager: ConnectionManager,
    handlers: HashMap<String, TaskHandler>,
    poll_interval: Duration,
}

impl SchedulerWorker {
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            handlers: HashMap::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn register<F, Fut>(&mut self, kind: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BookingResult<()>> + Send + 'static,
    {
        self.handlers
            .insert(kind.to_string(), Arc::new(move |payload| Box::pin(handler(payload))));
    }

    pub async fn run(self) -> AnyResult<()> {
        let handlers = Arc::new(self.handlers);
        let mut ticker = tokio::time::interval(self.poll_interval);
        info!("scheduler worker started");

        loop {
            ticker.tick().await;

            let mut conn = self.conn_manager.clone();
            let now = chrono::Utc::now().timestamp();

            let due: Vec<String> = match conn
                .zrangebyscore_limit(DUE_SET, "-inf", now, 0, CLAIM_BATCH)
                .await
            {
                Ok(due) => due,
                Err(err) => {
                    error!(%err, "error polling scheduler queue");
                    continue;
                }
            };

            for task_id in due {
                let claimed: i64 = match conn.zrem(DUE_SET, &task_id).await {
                    Ok(claimed) => claimed,
                    Err(err) => {
                        error!(%err, task_id, "error claiming scheduled task");
                        continue;
                    }
                };
                if claimed == 0 {
                    // Another worker claimed it, or it was cancelled.
                    continue;
                }

                let conn = self.conn_manager.clone();
                let handlers = Arc::clone(&handlers);
                tokio::spawn(async move {
                    if let Err(err) = fire_task(conn, handlers, &task_id).await {
                        error!(%err, task_id, "error firing scheduled task");
                    }
                });
            }
        }
    }
}

async fn fire_task(
    mut conn: ConnectionManager,
    handlers: Arc<HashMap<String, TaskHandler>>,
    task_id: &str,
) -> AnyResult<()> {
    let key = task_key(task_id);
    let fields: HashMap<String, String> = conn
        .hgetall(&key)
        .await
        .context("error loading scheduled task")?;
    if fields.is_empty() {
        // Cancelled between claim and load.
        return Ok(());
    }

    let kind = fields
        .get("kind")
        .ok_or_else(|| anyhow!("scheduled task without kind"))?;
    let payload: serde_json::Value = fields
        .get("payload")
        .map(|raw| serde_json::from_str(raw))
        .transpose()
        .context("error parsing scheduled task payload")?
        .unwrap_or(serde_json::Value::Null);
    let timeout_secs: u64 = fields
        .get("timeout_secs")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let attempts: u32 = fields
        .get("attempts")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);

    let Some(handler) = handlers.get(kind) else {
        warn!(task_id, kind, "no handler registered for scheduled task");
        let _: i64 = conn.del(&key).await.context("error dropping task")?;
        return Ok(());
    };

    let outcome = match tokio::time::timeout(
        Duration::from_secs(timeout_secs.max(1)),
        handler(payload),
    )
    .await
    {
        Ok(outcome) => outcome.map_err(anyhow::Error::from),
        Err(_) => Err(anyhow!("scheduled task timed out")),
    };

    match outcome {
        Ok(()) => {
            let _: i64 = conn.del(&key).await.context("error finishing task")?;
        }
        Err(err) => {
            let next_attempt = attempts + 1;
            if next_attempt < MAX_ATTEMPTS {
                warn!(%err, task_id, attempt = next_attempt, "scheduled task failed, retrying");
                let retry_at = chrono::Utc::now().timestamp() + RETRY_BACKOFF.as_secs() as i64;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .hset(&key, "attempts", next_attempt)
                    .zadd(DUE_SET, task_id, retry_at);
                let _: () = pipe
                    .query_async(&mut conn)
                    .await
                    .context("error requeueing task")?;
            } else {
                error!(%err, task_id, "scheduled task failed permanently, dropping");
                let _: i64 = conn.del(&key).await.context("error dropping task")?;
            }
        }
    }

    Ok(())
}
