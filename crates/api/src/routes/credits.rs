//! `GET /credits/status` — supplemented from `routes/credit_routes.py`
//! (SPEC_FULL.md §10): a thin read view over the Credit Meter (C3).

use axum::{extract::State, Json};
use commitly_core::credit::CreditStatus;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<CreditStatus>> {
    let status = state.credits.status(&auth.user_id).await?;
    Ok(Json(status))
}
