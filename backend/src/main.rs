use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use backend::{
    axum_http::{http_serve, routers::AppState},
    config::config_loader,
    consumer,
    usecases::bookings::BookingUseCase,
};
use domain::{
    error::BookingError,
    repositories::{
        booking_store::BookingStore, event_bus::EventBus, service_gateway::ServiceGateway,
        stock_cache::StockCache, task_scheduler::TaskScheduler,
    },
    value_objects::events::{PaymentExpirationTask, TASK_SET_PAYMENT_EXPIRED},
};
use infra::{
    cache::stock_cache::StockCacheRedis,
    http_gateway::{
        circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, TripPolicy},
        service_gateway::{HttpServiceGateway, ServiceEndpoints},
    },
    messaging::amqp::AmqpEventBus,
    postgres::{postgres_connection, repositories::booking_store::BookingStorePostgres},
    scheduler::delay_queue::{RedisTaskScheduler, SchedulerWorker},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("Backend exited with error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_observability("backend")?;

    let config = Arc::new(config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &config.database.url(),
        config.database.max_open_conns,
        config.database.max_idle_conns,
    )?;
    info!("Postgres connection has been established");

    let redis_client = redis::Client::open(config.redis.url())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    info!("Redis connection has been established");

    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        policy: trip_policy(&config.http_client),
        cool_down: Duration::from_secs(config.http_client.timeout),
    });
    let gateway: Arc<dyn ServiceGateway> = Arc::new(HttpServiceGateway::new(
        breaker,
        ServiceEndpoints {
            user_service_base: config.services.user_service_base(),
            ticket_service_base: config.services.ticket_service_base(),
            payment_service_endpoint: config.services.payment_service_endpoint.clone(),
        },
        Duration::from_secs(config.http_client.timeout),
    )?);

    let store: Arc<dyn BookingStore> =
        Arc::new(BookingStorePostgres::new(Arc::new(postgres_pool)));
    let stock_cache: Arc<dyn StockCache> = Arc::new(StockCacheRedis::new(
        redis_conn.clone(),
        Arc::clone(&gateway),
    ));
    let scheduler: Arc<dyn TaskScheduler> =
        Arc::new(RedisTaskScheduler::new(redis_conn.clone()));

    let amqp_bus = Arc::new(
        AmqpEventBus::connect(
            &config.message_stream.uri(),
            &config.message_stream.exchange_name,
        )
        .await?,
    );
    let bus: Arc<dyn EventBus> = Arc::clone(&amqp_bus) as Arc<dyn EventBus>;

    let usecase = Arc::new(BookingUseCase::new(
        store,
        stock_cache,
        Arc::clone(&gateway),
        bus,
        scheduler,
    ));

    // Scheduler fire loop with the payment-expiry handler registered.
    let mut scheduler_worker = SchedulerWorker::new(redis_conn);
    {
        let usecase = Arc::clone(&usecase);
        scheduler_worker.register(TASK_SET_PAYMENT_EXPIRED, move |payload| {
            let usecase = Arc::clone(&usecase);
            async move {
                let task: PaymentExpirationTask = serde_json::from_value(payload)
                    .map_err(|err| BookingError::Internal(err.into()))?;
                usecase.set_payment_expired(&task).await
            }
        });
    }
    let scheduler_loop = tokio::spawn(scheduler_worker.run());

    let consumer_loop = tokio::spawn(consumer::run_book_ticket_consumer(
        Arc::clone(&amqp_bus),
        Arc::clone(&usecase),
    ));

    let state = AppState { usecase, gateway };
    let http_server = tokio::spawn(http_serve::start(config, state));

    tokio::select! {
        result = consumer_loop => result??,
        result = scheduler_loop => result??,
        result = http_server => result??,
    };

    Ok(())
}

fn trip_policy(http_client: &backend::config::config_model::HttpClient) -> TripPolicy {
    match http_client.breaker_type.as_str() {
        "error_rate" => TripPolicy::ErrorRate {
            rate: http_client.error_rate,
            threshold: http_client.threshold,
        },
        _ => TripPolicy::Consecutive {
            failures: http_client.consecutive_failures,
        },
    }
}
