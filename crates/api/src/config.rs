//! API-layer configuration. Wraps `commitly_core::Config` (database,
//! redis, credit/backfill knobs) and adds the handful of settings that
//! only the HTTP surface needs: the JWT termination boundary and the
//! bind address.

use std::env;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub core: commitly_core::Config,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub cors_allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let core = commitly_core::Config::from_env()?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            core,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret,
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            cors_allowed_origins,
        })
    }
}
