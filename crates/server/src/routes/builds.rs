use appforge_core::{BuildRequest, BuildResponse};
use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// Entry point used by the evaluator: round 1 builds, later rounds update.
///
/// With a build queue configured the request is validated, queued and
/// answered right away with the predicted URLs.
#[utoipa::path(
    post,
    path = "/api/v1/api-endpoint",
    request_body = BuildRequest,
    responses(
        (status = 200, description = "Build finished or queued", body = BuildResponse),
        (status = 400, description = "Invalid round or task", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid secret", body = crate::error::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::error::ErrorResponse),
        (status = 500, description = "Pipeline failed", body = crate::error::ErrorResponse)
    ),
    tag = "build"
)]
pub async fn dispatch_build(
    State(state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildResponse>, AppError> {
    let Some(queue) = state.queue.as_ref() else {
        return run_build(&state, request).await;
    };

    let (mode, name) = state.orchestrator.validate(&request)?;
    let urls = state.orchestrator.artifact_urls(&request.task).await?;

    info!(task = %request.task, round = mode.round(), repo = %name, "Queueing build");
    queue.enqueue(request)?;

    Ok(Json(BuildResponse::queued(urls.repo_url, urls.pages_url)))
}

#[utoipa::path(
    post,
    path = "/api/v1/build",
    request_body = BuildRequest,
    responses(
        (status = 200, description = "Application built and deployed", body = BuildResponse),
        (status = 400, description = "Round is not 1", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid secret", body = crate::error::ErrorResponse),
        (status = 500, description = "Pipeline failed", body = crate::error::ErrorResponse)
    ),
    tag = "build"
)]
pub async fn build_app(
    State(state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildResponse>, AppError> {
    state.orchestrator.authenticate(&request.secret)?;
    if request.round != 1 {
        return Err(AppError::BadRequest(format!(
            "Round {} must be sent to /api/v1/build/update",
            request.round
        )));
    }
    run_build(&state, request).await
}

#[utoipa::path(
    post,
    path = "/api/v1/build/update",
    request_body = BuildRequest,
    responses(
        (status = 200, description = "Application updated", body = BuildResponse),
        (status = 400, description = "Round is lower than 2", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid secret", body = crate::error::ErrorResponse),
        (status = 500, description = "Pipeline failed", body = crate::error::ErrorResponse)
    ),
    tag = "build"
)]
pub async fn update_app(
    State(state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildResponse>, AppError> {
    state.orchestrator.authenticate(&request.secret)?;
    if request.round < 2 {
        return Err(AppError::BadRequest(format!(
            "Round {} must be sent to /api/v1/build",
            request.round
        )));
    }
    run_build(&state, request).await
}

async fn run_build(state: &AppState, request: BuildRequest) -> Result<Json<BuildResponse>, AppError> {
    let outcome = state.orchestrator.run(&request).await?;
    Ok(Json(outcome.response))
}
