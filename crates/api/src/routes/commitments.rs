//! Commitment operations (spec.md §6): complete/delete/restore plus the
//! completed/deleted list views and the general query endpoint backed
//! by `core::query::fetch_commitments`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use commitly_core::commitment::filters::completed_items;
use commitly_core::query::{self, QueryResult};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub completed: bool,
}

pub async fn complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<Json<commitly_core::commitment::Commitment>> {
    let commitment = state.commitments.mark_completed(&auth.user_id, id, body.completed).await?;
    Ok(Json(commitment))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.commitments.delete(&auth.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn restore(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<commitly_core::commitment::Commitment>> {
    let commitment = state.commitments.restore(&auth.user_id, id).await?;
    Ok(Json(commitment))
}

#[derive(Debug, Deserialize)]
pub struct DeletedQuery {
    pub limit: Option<i64>,
}

pub async fn list_deleted(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<DeletedQuery>,
) -> ApiResult<Json<Vec<commitly_core::shadow::ShadowEntry>>> {
    let entries = state.commitments.list_deleted(&auth.user_id, q.limit.unwrap_or(100)).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct CompletedQuery {
    pub today_only: Option<bool>,
}

pub async fn list_completed(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<CompletedQuery>,
) -> ApiResult<Json<QueryResult>> {
    let mut filters = completed_items();
    if q.today_only.unwrap_or(false) {
        let start = today().midnight().assume_utc();
        filters.created_after = Some(start);
    }
    let result = query::fetch_commitments(
        state.commitments.as_ref(),
        &auth.user_id,
        &filters,
        today(),
        state.config.core.commitment_upcoming_days,
    )
    .await?;
    Ok(Json(result))
}
