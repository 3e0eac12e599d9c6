//! Typed process-wide configuration, populated once at startup and
//! injected into every component (spec.md §9's redesign flag: no
//! module-level constants read from env at arbitrary call sites).

use std::env;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Credit metering + backfill + query knobs, spec.md §6 "Environment".
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    pub input_tokens_per_credit: f64,
    pub output_tokens_per_credit: f64,
    pub default_free_trial_credits: f64,

    pub initial_sync_max_inbox: usize,
    pub initial_sync_max_sent: usize,
    pub initial_sync_batch: usize,

    pub commitment_upcoming_days: i64,
    pub commitment_default_limit: i64,

    pub extraction_retries: usize,
    pub extraction_max_tokens: u32,

    pub trigger_lock_staleness_seconds: i64,
    pub webhook_claim_timeout_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),

            input_tokens_per_credit: env_parse("INPUT_TOKENS_PER_CREDIT", 1000.0),
            output_tokens_per_credit: env_parse("OUTPUT_TOKENS_PER_CREDIT", 500.0),
            default_free_trial_credits: env_parse("DEFAULT_FREE_TRIAL_CREDITS", 2500.0),

            initial_sync_max_inbox: env_parse("INITIAL_SYNC_MAX_INBOX", 100),
            initial_sync_max_sent: env_parse("INITIAL_SYNC_MAX_SENT", 100),
            initial_sync_batch: env_parse("INITIAL_SYNC_BATCH", 50),

            commitment_upcoming_days: env_parse("COMMITMENT_UPCOMING_DAYS", 7),
            commitment_default_limit: env_parse("COMMITMENT_DEFAULT_LIMIT", 100),

            extraction_retries: env_parse("EXTRACTION_RETRIES", 2),
            extraction_max_tokens: env_parse("EXTRACTION_MAX_TOKENS", 1500),

            // Sole staleness-recovery mechanism in the system (spec.md §4.6/§5);
            // backfill's sync_in_progress lock has no equivalent.
            trigger_lock_staleness_seconds: 5 * 60,
            webhook_claim_timeout_minutes: 30,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_missing_or_invalid() {
        assert_eq!(env_parse::<f64>("COMMITLY_TEST_NOPE", 42.0), 42.0);
    }
}
