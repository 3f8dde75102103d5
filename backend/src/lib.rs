pub mod auth;
pub mod axum_http;
pub mod config;
pub mod consumer;
pub mod usecases;
