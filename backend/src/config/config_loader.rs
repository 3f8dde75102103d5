use anyhow::{Context, Result};
use std::fmt::Debug;
use std::str::FromStr;

use super::config_model::{
    Database, DotEnvyConfig, HttpClient, MessageStream, Redis, Server, Services,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: parsed("SERVER_PORT")?,
        body_limit: parsed_or("SERVER_BODY_LIMIT", 10)?,
        timeout: parsed_or("SERVER_TIMEOUT", 30)?,
    };

    let database = Database {
        host: required("DATABASE_HOST")?,
        port: parsed_or("DATABASE_PORT", 5432)?,
        username: required("DATABASE_USERNAME")?,
        password: required("DATABASE_PASSWORD")?,
        db_name: required("DATABASE_DB_NAME")?,
        max_open_conns: parsed_or("DATABASE_MAX_OPEN_CONNS", 10)?,
        max_idle_conns: parsed_or("DATABASE_MAX_IDLE_CONNS", 2)?,
    };

    let redis = Redis {
        host: required("REDIS_HOST")?,
        port: parsed_or("REDIS_PORT", 6379)?,
        password: optional("REDIS_PASSWORD"),
        db: parsed_or("REDIS_DB", 0)?,
    };

    let message_stream = MessageStream {
        host: required("MESSAGE_STREAM_HOST")?,
        port: parsed_or("MESSAGE_STREAM_PORT", 5672)?,
        username: required("MESSAGE_STREAM_USERNAME")?,
        password: required("MESSAGE_STREAM_PASSWORD")?,
        exchange_name: required("MESSAGE_STREAM_EXCHANGE_NAME")?,
    };

    let http_client = HttpClient {
        timeout: parsed_or("HTTP_CLIENT_TIMEOUT", 10)?,
        consecutive_failures: parsed_or("HTTP_CLIENT_CONSECUTIVE_FAILURES", 5)?,
        error_rate: parsed_or("HTTP_CLIENT_ERROR_RATE", 0.5)?,
        threshold: parsed_or("HTTP_CLIENT_THRESHOLD", 10)?,
        breaker_type: optional_or("HTTP_CLIENT_TYPE", "consecutive"),
    };

    let services = Services {
        user_service_host: required("USER_SERVICE_HOST")?,
        user_service_port: parsed("USER_SERVICE_PORT")?,
        ticket_service_host: required("TICKET_SERVICE_HOST")?,
        ticket_service_port: parsed("TICKET_SERVICE_PORT")?,
        payment_service_endpoint: required("PAYMENT_SERVICE_ENDPOINT")?,
    };

    Ok(DotEnvyConfig {
        server,
        database,
        redis,
        message_stream,
        http_client,
        services,
    })
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is not set"))
}

fn optional(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

fn optional_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    required(key)?
        .parse()
        .with_context(|| format!("{key} is invalid"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Debug,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
        Err(_) => Ok(default),
    }
}
