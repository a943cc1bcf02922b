use appforge_core::{EvaluationEntry, EvaluationFilter, Page, Submission, SubmissionFilter};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubmissionQuery {
    pub email: Option<String>,
    pub task: Option<String>,
    /// Page size, 1 to 200 (default 50)
    pub limit: Option<u32>,
    /// Zero-based offset (default 0)
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EvaluationQuery {
    pub email: Option<String>,
    pub task: Option<String>,
    pub round: Option<u32>,
    /// Page size, 1 to 200 (default 50)
    pub limit: Option<u32>,
    /// Zero-based offset (default 0)
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmissionList {
    pub total: u64,
    pub items: Vec<Submission>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluationList {
    pub total: u64,
    pub items: Vec<EvaluationEntry>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/submissions",
    params(SubmissionQuery),
    responses(
        (status = 200, description = "Submissions, most recent first", body = SubmissionList),
        (status = 400, description = "Invalid pagination", body = crate::error::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionQuery>,
) -> Result<Json<SubmissionList>, AppError> {
    let page = Page::new(query.limit, query.offset)?;
    let filter = SubmissionFilter {
        email: query.email,
        task: query.task,
    };

    let result = state.submissions.list_submissions(&filter, page).await?;
    Ok(Json(SubmissionList {
        total: result.total,
        items: result.items,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/evaluations",
    params(EvaluationQuery),
    responses(
        (status = 200, description = "Evaluation results, most recent first", body = EvaluationList),
        (status = 400, description = "Invalid pagination", body = crate::error::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn list_evaluations(
    State(state): State<AppState>,
    Query(query): Query<EvaluationQuery>,
) -> Result<Json<EvaluationList>, AppError> {
    let page = Page::new(query.limit, query.offset)?;
    let filter = EvaluationFilter {
        email: query.email,
        task: query.task,
        round: query.round,
    };

    let result = state.submissions.list_evaluations(&filter, page).await?;
    Ok(Json(EvaluationList {
        total: result.total,
        items: result.items,
    }))
}
