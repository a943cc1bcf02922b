use appforge_core::EvaluationWebhook;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
}

/// Records an evaluator verdict. Redelivering the same (email, task, round,
/// nonce) updates the submission and appends another result.
#[utoipa::path(
    post,
    path = "/api/v1/evaluation/webhook",
    request_body = EvaluationWebhook,
    responses(
        (status = 200, description = "Evaluation recorded", body = WebhookAck),
        (status = 401, description = "Invalid secret", body = crate::error::ErrorResponse),
        (status = 500, description = "Database error", body = crate::error::ErrorResponse)
    ),
    tag = "evaluation"
)]
pub async fn evaluation_webhook(
    State(state): State<AppState>,
    Json(payload): Json<EvaluationWebhook>,
) -> Result<Json<WebhookAck>, AppError> {
    state.orchestrator.authenticate(&payload.secret)?;

    let recorded = state
        .submissions
        .record_evaluation(&payload.into_record())
        .await?;

    info!(
        submission_id = %recorded.submission.id,
        evaluation_id = %recorded.evaluation.id,
        created = recorded.created,
        passed = recorded.evaluation.passed,
        "Evaluation recorded"
    );

    Ok(Json(WebhookAck { ok: true }))
}
