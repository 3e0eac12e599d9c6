// API crate clippy configuration
#![allow(clippy::too_many_arguments)]
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! HTTP ingress (C11) for the commitment ingestion and lifecycle
//! engine: axum handlers, JWT auth termination, request validation,
//! enqueue onto the webhook intake queue. Domain logic lives in
//! `commitly_core`; this crate is transport only.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
