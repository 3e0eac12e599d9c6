//! Connection lifecycle endpoints (spec.md §4.6, §6): `check-connection`
//! drives the state machine transitions, `disconnect` tears triggers
//! down, `sync-status` is a read-only snapshot.

use axum::{extract::State, Json};
use commitly_core::extraction::UserContext;
use commitly_core::pipeline::backfill::{self, BackfillDeps};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckConnectionBody {
    pub entity_id: String,
    pub founder_name: String,
    pub founder_email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckConnectionResponse {
    pub connected: bool,
    pub sync_status: &'static str,
    pub connection_id: Option<String>,
    pub inbox_trigger_id: Option<String>,
    pub sent_trigger_id: Option<String>,
}

/// Runs the state machine (spec.md §4.6). Kicking off backfill/trigger
/// provisioning requires a concrete mailbox SDK adapter, which is out
/// of scope (spec.md §1) — when one isn't wired into `AppState`, this
/// still performs the connection bookkeeping and reports
/// `sync_status = "started"` without running the pipeline inline.
pub async fn check_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CheckConnectionBody>,
) -> ApiResult<Json<CheckConnectionResponse>> {
    let existing = state.connections.get(&auth.user_id).await?;
    let first_time = existing.as_ref().map(|s| s.should_run_initial_sync()).unwrap_or(true);

    if first_time {
        state.connections.mark_first_connection(&auth.user_id, &body.entity_id).await?;
        tracing::info!(user_id = %auth.user_id, "first connection established");
    } else {
        state.connections.mark_reconnection(&auth.user_id, &body.entity_id).await?;
        tracing::info!(user_id = %auth.user_id, "reconnection established");
    }

    let refreshed = state
        .connections
        .get(&auth.user_id)
        .await?
        .ok_or_else(|| commitly_core::CoreError::UserMissing(auth.user_id.clone()))?;

    let sync_status = if let (Some(aggregator), Some(extractor), Some(triggers)) =
        (state.aggregator.as_ref(), state.extractor.as_ref(), state.triggers.as_ref())
    {
        if first_time {
            let deps = BackfillDeps {
                aggregator: aggregator.as_ref(),
                extractor: extractor.as_ref(),
                commitments: state.commitments.as_ref(),
                connections: state.connections.as_ref(),
                credits: state.credits.as_ref(),
                triggers: triggers.as_ref(),
                config: &state.config.core,
            };
            let user_context = UserContext::new(&auth.user_id, &body.founder_name, &body.founder_email);
            let first_connected_at = refreshed.first_connected_at.unwrap_or_else(time::OffsetDateTime::now_utc);
            backfill::run_initial_sync(&deps, &auth.user_id, &body.entity_id, &user_context, first_connected_at).await?;
            "completed"
        } else {
            commitly_core::trigger::ensure_triggers(
                state.connections.as_ref(),
                triggers.as_ref(),
                &auth.user_id,
                &body.entity_id,
                Duration::seconds(state.config.core.trigger_lock_staleness_seconds),
            )
            .await?;
            "reconnected"
        }
    } else {
        "started"
    };

    let refreshed = state
        .connections
        .get(&auth.user_id)
        .await?
        .ok_or_else(|| commitly_core::CoreError::UserMissing(auth.user_id.clone()))?;

    Ok(Json(CheckConnectionResponse {
        connected: refreshed.connection_enabled,
        sync_status,
        connection_id: refreshed.entity_id,
        inbox_trigger_id: refreshed.inbox_trigger_id,
        sent_trigger_id: refreshed.sent_trigger_id,
    }))
}

pub async fn disconnect(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<serde_json::Value>> {
    state.connections.mark_disconnection(&auth.user_id).await?;
    tracing::info!(user_id = %auth.user_id, "connection torn down");
    Ok(Json(serde_json::json!({ "disconnected": true })))
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub connected: bool,
    pub initial_sync_completed: bool,
    pub sync_in_progress: bool,
    pub commitments_found: i64,
}

pub async fn sync_status(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<SyncStatusResponse>> {
    let state_row = state
        .connections
        .get(&auth.user_id)
        .await?
        .ok_or_else(|| commitly_core::CoreError::UserMissing(auth.user_id.clone()))?;

    Ok(Json(SyncStatusResponse {
        connected: state_row.connection_enabled,
        initial_sync_completed: state_row.initial_sync_completed,
        sync_in_progress: state_row.sync_in_progress,
        commitments_found: state_row.total_commitments_found,
    }))
}
