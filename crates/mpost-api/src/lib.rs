//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload, process, status, cancel and download endpoints for image jobs
//! - Pricing, balance, checkout and payment webhook endpoints
//! - Bearer token authentication with a demo mode
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use auth::{AuthService, AuthUser};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::PaymentsClient;
pub use state::AppState;
