use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness probe. Every teacher service under orchestration carries
/// one (SPEC_FULL.md §6); grounded in the worker's heartbeat job.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    Json(json!({ "status": if db_ok { "ok" } else { "degraded" }, "database": db_ok }))
}
