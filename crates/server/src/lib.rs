pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rate_limit::rate_limit_middleware;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "App Builder API",
        version = "0.1.0",
        description = "API for building and deploying applications based on user requests"
    ),
    paths(
        routes::health_check,
        routes::builds::dispatch_build,
        routes::builds::build_app,
        routes::builds::update_app,
        routes::evaluation::evaluation_webhook,
        routes::admin::list_submissions,
        routes::admin::list_evaluations,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::evaluation::WebhookAck,
        routes::admin::SubmissionList,
        routes::admin::EvaluationList,
        error::ErrorResponse,
        appforge_core::BuildRequest,
        appforge_core::BuildResponse,
        appforge_core::Attachment,
        appforge_core::EvaluationWebhook,
        appforge_core::Submission,
        appforge_core::EvaluationEntry,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "build", description = "Build and update generated applications"),
        (name = "evaluation", description = "Evaluator callbacks"),
        (name = "admin", description = "Submission ledger queries"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/api/v1/api-endpoint", post(routes::builds::dispatch_build))
        .route("/api/v1/build", post(routes::builds::build_app))
        .route("/api/v1/build/update", post(routes::builds::update_app))
        .route(
            "/api/v1/evaluation/webhook",
            post(routes::evaluation::evaluation_webhook),
        )
        .route("/api/v1/admin/submissions", get(routes::admin::list_submissions))
        .route("/api/v1/admin/evaluations", get(routes::admin::list_evaluations))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api/v1/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
