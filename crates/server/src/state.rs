use std::sync::Arc;

use appforge_core::BuildRequest;
use db::SubmissionRepository;
use orchestrator::{BuildJobHandler, BuildOrchestrator, JobQueue};
use sqlx::SqlitePool;

use crate::rate_limit::RateLimitState;

pub type BuildQueue = JobQueue<BuildRequest>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BuildOrchestrator>,
    pub submissions: SubmissionRepository,
    /// Present when dispatcher requests are built in the background.
    pub queue: Option<Arc<BuildQueue>>,
    pub rate_limit: RateLimitState,
    pub environment: &'static str,
}

impl AppState {
    pub fn new(pool: SqlitePool, orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self {
            orchestrator,
            submissions: SubmissionRepository::new(pool),
            queue: None,
            rate_limit: RateLimitState::default(),
            environment: "production",
        }
    }

    /// Routes dispatcher requests through a background queue. The queue still
    /// has to be started.
    pub fn with_build_queue(mut self) -> Self {
        let handler = Arc::new(BuildJobHandler::new(self.orchestrator.clone()));
        self.queue = Some(Arc::new(JobQueue::new(handler)));
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitState) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_environment(mut self, environment: &'static str) -> Self {
        self.environment = environment;
        self
    }
}
