#![allow(clippy::too_many_arguments)]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Commitment ingestion and lifecycle engine — HTTP server.

mod auth;
mod config;
mod error;
mod routes;
mod security;
mod state;

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::ApiConfig, routes::create_router, security::security_headers_middleware, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commitly_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting commitment engine API v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::from_env()?;
    tracing::info!("configuration loaded");

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.core.database_url)
        .await?;
    tracing::info!("database connection established");

    tracing::info!("running migrations...");
    commitly_core::run_migrations(&pool).await?;
    tracing::info!("migrations applied");

    let state = AppState::new(pool, config.clone())?;

    let allowed_origins: Vec<HeaderValue> = if config.cors_allowed_origins.is_empty() {
        "http://localhost:3000,http://127.0.0.1:3000"
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect()
    } else {
        config.cors_allowed_origins.iter().filter_map(|s| s.parse().ok()).collect()
    };

    tracing::info!(allowed_origins = ?allowed_origins, "cors configured with {} allowed origins", allowed_origins.len());

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
