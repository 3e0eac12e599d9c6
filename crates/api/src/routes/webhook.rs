//! `POST /webhook` (spec.md §4.9, §6): aggregator -> pipeline ingress.
//! Always 200 on a well-formed payload; credit exhaustion surfaces as
//! a `skipped` body rather than an error, matching the teacher's
//! Stripe webhook handler's "ack fast, process later" shape.

use axum::{extract::State, Json};
use commitly_core::pipeline::live::{enqueue, EnqueueOutcome, WebhookPayload};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub user_id: String,
    #[serde(alias = "connection_id")]
    pub connection_nano_id: String,
    #[serde(alias = "id")]
    pub message_id: String,
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> ApiResult<Json<Value>> {
    let payload = WebhookPayload {
        user_id: envelope.data.user_id,
        connected_account_id: envelope.data.connection_nano_id,
        message_id: envelope.data.message_id,
    };

    tracing::info!(event_type = %envelope.event_type, user_id = %payload.user_id, "webhook received");

    let outcome = enqueue(&state.pool, state.credits.as_ref(), &payload)
        .await
        .map_err(ApiError::from)?;

    match outcome {
        EnqueueOutcome::Enqueued => Ok(Json(json!({ "status": "queued" }))),
        EnqueueOutcome::SkippedNoCredits => Ok(Json(json!({ "status": "skipped", "reason": "no_credits" }))),
    }
}
