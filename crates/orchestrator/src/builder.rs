use std::sync::Arc;

use appforge_core::{
    artifact_name, BuildMode, BuildRequest, BuildResponse, FileMap, RequirementsDocument,
};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use github::{mit_license, ArtifactUrls, CreateRepoRequest, GitHubError, HostedRepository, HostingProvider};
use llm::GenerationBackend;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{OrchestratorError, Result};
use crate::generation::{generate_files, stamp_readme};
use crate::locks::ArtifactLocks;
use crate::notifier::{DeliveryOutcome, Notifier};
use crate::poller::{LivenessPoller, PollOutcome};
use crate::queue::JobHandler;
use crate::state_machine::{BuildStage, BuildStateMachine};

const BRIEF_SUMMARY_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Token every build request must carry.
    pub shared_secret: String,
    pub pages_branch: String,
    pub pages_path: String,
    pub liveness: BackoffPolicy,
    pub notification: BackoffPolicy,
}

impl BuildConfig {
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            pages_branch: "gh-pages".to_string(),
            pages_path: "/".to_string(),
            liveness: BackoffPolicy::liveness(),
            notification: BackoffPolicy::notification(),
        }
    }

    pub fn with_policies(mut self, liveness: BackoffPolicy, notification: BackoffPolicy) -> Self {
        self.liveness = liveness;
        self.notification = notification;
        self
    }
}

/// Result of one pipeline run. Liveness and notification never fail a build,
/// so their outcomes are reported here instead.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub response: BuildResponse,
    pub liveness: PollOutcome,
    pub delivery: DeliveryOutcome,
    pub used_fallback: bool,
}

struct StageTracker<'a> {
    stage: BuildStage,
    task: &'a str,
    round: u32,
}

impl<'a> StageTracker<'a> {
    fn new(task: &'a str, round: u32) -> Self {
        Self {
            stage: BuildStage::Validating,
            task,
            round,
        }
    }

    fn advance(&mut self, to: BuildStage) -> Result<()> {
        BuildStateMachine::validate_transition(self.stage, to)?;
        debug!(
            task = self.task,
            round = self.round,
            from = self.stage.as_str(),
            stage = to.as_str(),
            "Build stage"
        );
        self.stage = to;
        Ok(())
    }
}

/// Drives generate → publish → verify → notify for one build request.
pub struct BuildOrchestrator {
    generator: Arc<dyn GenerationBackend>,
    hosting: Arc<dyn HostingProvider>,
    poller: LivenessPoller,
    notifier: Notifier,
    locks: ArtifactLocks,
    config: BuildConfig,
}

impl BuildOrchestrator {
    pub fn new(
        generator: Arc<dyn GenerationBackend>,
        hosting: Arc<dyn HostingProvider>,
        config: BuildConfig,
    ) -> Self {
        Self {
            generator,
            hosting,
            poller: LivenessPoller::new(),
            notifier: Notifier::new(),
            locks: ArtifactLocks::new(),
            config,
        }
    }

    pub fn with_poller(mut self, poller: LivenessPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Exact comparison against the configured shared secret.
    pub fn authenticate(&self, secret: &str) -> Result<()> {
        if secret == self.config.shared_secret {
            Ok(())
        } else {
            Err(OrchestratorError::Authentication)
        }
    }

    /// Checks the secret, the round and the task identifier.
    pub fn validate(&self, request: &BuildRequest) -> Result<(BuildMode, String)> {
        self.authenticate(&request.secret)?;
        let mode = request.mode()?;
        let name = artifact_name(&request.task)?;
        Ok((mode, name))
    }

    /// Repository and site URLs a task's artifact has or will have.
    pub async fn artifact_urls(&self, task: &str) -> Result<ArtifactUrls> {
        let name = artifact_name(task)?;
        Ok(self.hosting.artifact_urls(&name).await?)
    }

    pub async fn run(&self, request: &BuildRequest) -> Result<BuildOutcome> {
        let mut tracker = StageTracker::new(&request.task, request.round);

        let (mode, name) = self.validate(request)?;

        info!(
            task = %request.task,
            round = request.round,
            repo = %name,
            "Starting {}",
            mode.verb()
        );

        match self.execute(request, mode, &name, &mut tracker).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    task = %request.task,
                    round = request.round,
                    repo = %name,
                    stage = tracker.stage.as_str(),
                    error = %e,
                    "Failed to {} application",
                    mode.verb()
                );
                if let Err(transition) = tracker.advance(BuildStage::Failed) {
                    debug!(error = %transition, "Build stage not moved to failed");
                }
                Err(OrchestratorError::pipeline_failed(mode.verb(), e.to_string()))
            }
        }
    }

    async fn execute(
        &self,
        request: &BuildRequest,
        mode: BuildMode,
        name: &str,
        tracker: &mut StageTracker<'_>,
    ) -> Result<BuildOutcome> {
        tracker.advance(BuildStage::Generating)?;
        let mut requirements = RequirementsDocument::from_request(request);
        let existing = match mode {
            BuildMode::Initial => None,
            BuildMode::Update { round } => {
                let repo = self.hosting.get_repository(name).await?;
                let files = self.hosting.list_files(&repo).await?;
                debug!(repo = %name, files = files.len(), "Loaded existing files");
                requirements = requirements.with_existing_files(files, round);
                Some(repo)
            }
        };

        let generated = generate_files(self.generator.as_ref(), &requirements).await;
        let mut files = generated.files;
        if mode.is_initial() {
            stamp_readme(&mut files);
        }

        let repo = match existing {
            Some(repo) => repo,
            None => {
                tracker.advance(BuildStage::PublishingRepo)?;
                self.ensure_repository(name, &request.task).await?
            }
        };

        let commit_sha = {
            let _guard = self.locks.acquire(name).await;

            tracker.advance(BuildStage::CommittingFiles)?;
            let message = commit_message(mode, &request.brief);
            let sha = self.commit_files(&repo, &files, &message).await?;

            tracker.advance(BuildStage::PublishingSite)?;
            self.publish_site(&repo, &sha, mode).await?;
            sha
        };

        tracker.advance(BuildStage::VerifyingLiveness)?;
        let liveness = self.poller.poll(&repo.pages_url, &self.config.liveness).await;
        if !liveness.is_ready() {
            warn!(repo = %name, pages_url = %repo.pages_url, "Continuing without a live site");
        }

        tracker.advance(BuildStage::NotifyingEvaluator)?;
        let notice = request.notice(&repo.html_url, &commit_sha, &repo.pages_url);
        let delivery = self
            .notifier
            .deliver(&request.evaluation_url, &notice, &self.config.notification)
            .await;

        tracker.advance(BuildStage::Done)?;
        info!(
            task = %request.task,
            round = request.round,
            repo = %name,
            commit = %commit_sha,
            "Finished {}",
            mode.verb()
        );

        Ok(BuildOutcome {
            response: BuildResponse::success(
                success_message(mode),
                repo.html_url,
                repo.pages_url,
                commit_sha,
            ),
            liveness,
            delivery,
            used_fallback: generated.used_fallback,
        })
    }

    /// Creates the repository, or reuses it if a previous run got that far.
    async fn ensure_repository(&self, name: &str, task: &str) -> Result<HostedRepository> {
        let description = format!("Generated app for task: {}", task);
        let request = CreateRepoRequest::public(name, description.clone());

        match self.hosting.create_repository(&request).await {
            Ok(repo) => {
                self.seed_repository(&repo, &description).await?;
                Ok(repo)
            }
            Err(GitHubError::RepoAlreadyExists { .. }) => {
                info!(repo = %name, "Repository exists, reusing it");
                let repo = self.hosting.get_repository(name).await?;
                let tip = self
                    .hosting
                    .branch_head(&repo, &repo.default_branch)
                    .await?;
                if tip.is_none() {
                    info!(repo = %name, "Existing repository is empty, seeding it");
                    self.seed_repository(&repo, &description).await?;
                }
                Ok(repo)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn seed_repository(&self, repo: &HostedRepository, description: &str) -> Result<()> {
        self.hosting
            .put_file(
                repo,
                "README.md",
                "Initial commit: Add README",
                &format!("# {}\n\n{}", repo.name, description),
            )
            .await?;

        let license = mit_license(Utc::now().year(), &repo.owner);
        if let Err(e) = self
            .hosting
            .put_file(repo, "LICENSE", "Add MIT LICENSE", &license)
            .await
        {
            warn!(repo = %repo.name, error = %e, "Could not add LICENSE");
        }

        Ok(())
    }

    /// Commits on top of the default branch tip, then moves the branch.
    async fn commit_files(&self, repo: &HostedRepository, files: &FileMap, message: &str) -> Result<String> {
        let branch = &repo.default_branch;
        let tip = self.hosting.branch_head(repo, branch).await?;
        let sha = self
            .hosting
            .create_commit(repo, files, message, tip.as_deref())
            .await?;

        match tip {
            Some(_) => self.hosting.move_branch(repo, branch, &sha, false).await?,
            None => self.hosting.create_branch(repo, branch, &sha).await?,
        }

        debug!(repo = %repo.name, branch = %branch, commit = %sha, "Branch moved");
        Ok(sha)
    }

    /// Points the publication branch at `sha`; the initial round also
    /// configures the site source.
    async fn publish_site(&self, repo: &HostedRepository, sha: &str, mode: BuildMode) -> Result<()> {
        let branch = &self.config.pages_branch;

        match self.hosting.branch_head(repo, branch).await? {
            Some(_) => self.hosting.move_branch(repo, branch, sha, true).await?,
            None if mode.is_initial() => self.hosting.create_branch(repo, branch, sha).await?,
            None => {
                debug!(repo = %repo.name, "No publication branch to sync");
                return Ok(());
            }
        }

        if mode.is_initial() {
            self.hosting
                .configure_pages(repo, branch, &self.config.pages_path)
                .await?;
        }

        Ok(())
    }
}

pub fn commit_message(mode: BuildMode, brief: &str) -> String {
    match mode {
        BuildMode::Initial => "Initial commit: Generated app structure".to_string(),
        BuildMode::Update { round } => {
            let summary: String = brief.chars().take(BRIEF_SUMMARY_CHARS).collect();
            format!("Update: Round {} - {}...", round, summary)
        }
    }
}

pub fn success_message(mode: BuildMode) -> String {
    match mode {
        BuildMode::Initial => "Application built and deployed successfully".to_string(),
        BuildMode::Update { round } => format!("Application updated successfully for round {}", round),
    }
}

/// Runs queued build requests through the orchestrator.
pub struct BuildJobHandler {
    orchestrator: Arc<BuildOrchestrator>,
}

impl BuildJobHandler {
    pub fn new(orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler<BuildRequest> for BuildJobHandler {
    async fn handle(&self, job: BuildRequest) -> Result<()> {
        let outcome = self.orchestrator.run(&job).await?;
        info!(
            task = %job.task,
            round = job.round,
            commit = ?outcome.response.commit_sha,
            "Queued build finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGenerator, FakeHosting};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "s3cret";

    #[test]
    fn test_stage_tracker_rejects_leaving_terminal_stage() {
        let mut tracker = StageTracker::new("todo list", 1);
        tracker.advance(BuildStage::Generating).unwrap();
        tracker.advance(BuildStage::Failed).unwrap();
        assert_eq!(tracker.stage, BuildStage::Failed);

        let err = tracker.advance(BuildStage::Failed).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: BuildStage::Failed,
                to: BuildStage::Failed
            }
        ));
        assert_eq!(tracker.stage, BuildStage::Failed);
    }

    fn fast(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    fn orchestrator(generator: FakeGenerator, hosting: Arc<FakeHosting>) -> BuildOrchestrator {
        let config = BuildConfig::new(SECRET).with_policies(fast(3), fast(3));
        BuildOrchestrator::new(Arc::new(generator), hosting, config)
    }

    fn request(server: &MockServer, round: u32) -> BuildRequest {
        BuildRequest {
            email: "student@example.com".to_string(),
            secret: SECRET.to_string(),
            task: "todo list".to_string(),
            round,
            nonce: "nonce-1".to_string(),
            brief: "Create a todo list app that lets users add, complete and delete items".to_string(),
            checks: vec!["Page has a #todo-input".to_string()],
            evaluation_url: format!("{}/notify", server.uri()),
            attachments: None,
        }
    }

    async fn live_site(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/todo-list/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    async fn live_site_and_evaluator(server: &MockServer) {
        live_site(server).await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[test]
    fn test_commit_messages() {
        assert_eq!(
            commit_message(BuildMode::Initial, "anything"),
            "Initial commit: Generated app structure"
        );
        let brief = "x".repeat(80);
        assert_eq!(
            commit_message(BuildMode::Update { round: 2 }, &brief),
            format!("Update: Round 2 - {}...", "x".repeat(50))
        );
        assert_eq!(
            success_message(BuildMode::Update { round: 3 }),
            "Application updated successfully for round 3"
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_makes_no_hosting_calls() {
        let server = MockServer::start().await;
        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::files(&[("index.html", "x")]), hosting.clone());

        let mut req = request(&server, 1);
        req.secret = "wrong".to_string();
        let err = orch.run(&req).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Authentication));
        assert!(hosting.calls().is_empty());
    }

    #[tokio::test]
    async fn test_round_zero_is_invalid() {
        let server = MockServer::start().await;
        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::files(&[]), hosting.clone());

        let err = orch.run(&request(&server, 0)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert!(hosting.calls().is_empty());
    }

    #[tokio::test]
    async fn test_initial_build_end_to_end() {
        let server = MockServer::start().await;
        live_site(&server).await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({
                "email": "student@example.com",
                "task": "todo list",
                "round": 1,
                "nonce": "nonce-1",
                "repo_url": "https://github.com/octo/todo-list"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let generator = FakeGenerator::files(&[("index.html", "<h1>Todo</h1>"), ("README.md", "# Todo")]);
        let orch = orchestrator(generator, hosting.clone());

        let outcome = orch.run(&request(&server, 1)).await.unwrap();

        assert_eq!(outcome.response.status, "success");
        assert_eq!(outcome.response.message, "Application built and deployed successfully");
        assert_eq!(outcome.response.repo_url, "https://github.com/octo/todo-list");
        assert_eq!(outcome.response.pages_url, format!("{}/todo-list/", server.uri()));
        assert_eq!(outcome.response.commit_sha.as_deref(), Some("commit-1"));
        assert_eq!(outcome.liveness, PollOutcome::Ready { attempts: 1 });
        assert!(outcome.delivery.is_delivered());
        assert!(!outcome.used_fallback);

        let calls = hosting.calls();
        assert_eq!(
            calls,
            vec![
                "create_repository todo-list",
                "put_file README.md",
                "put_file LICENSE",
                "branch_head main",
                "create_commit parent=seed",
                "move_branch main commit-1 force=false",
                "branch_head gh-pages",
                "create_branch gh-pages commit-1",
                "configure_pages gh-pages /",
            ]
        );

        let committed = hosting.committed_files();
        assert_eq!(committed["index.html"], "<h1>Todo</h1>");
        assert!(committed["README.md"].starts_with("# Todo\n\n---\n*Generated on "));
    }

    #[tokio::test]
    async fn test_initial_build_reuses_existing_repository() {
        let server = MockServer::start().await;
        live_site_and_evaluator(&server).await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        hosting.add_repository("todo-list", Some("old-tip"), true);
        let orch = orchestrator(FakeGenerator::files(&[("index.html", "v2")]), hosting.clone());

        let outcome = orch.run(&request(&server, 1)).await.unwrap();

        assert_eq!(outcome.response.commit_sha.as_deref(), Some("commit-1"));
        let calls = hosting.calls();
        assert!(calls.contains(&"get_repository todo-list".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("put_file")));
        assert!(calls.contains(&"create_commit parent=old-tip".to_string()));
        assert!(calls.contains(&"move_branch gh-pages commit-1 force=true".to_string()));
    }

    #[tokio::test]
    async fn test_reused_empty_repository_is_seeded_again() {
        let server = MockServer::start().await;
        live_site_and_evaluator(&server).await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        hosting.add_repository("todo-list", None, false);
        let orch = orchestrator(FakeGenerator::files(&[("index.html", "v1")]), hosting.clone());

        orch.run(&request(&server, 1)).await.unwrap();

        let calls = hosting.calls();
        assert!(calls.contains(&"put_file README.md".to_string()));
        assert!(calls.contains(&"create_commit parent=seed".to_string()));
    }

    #[tokio::test]
    async fn test_update_round_edits_existing_repository() {
        let server = MockServer::start().await;
        live_site_and_evaluator(&server).await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        hosting.add_repository("todo-list", Some("round-1"), true);
        hosting.set_files("todo-list", &[("index.html", "<h1>v1</h1>")]);
        let generator = FakeGenerator::files(&[("index.html", "<h1>v2</h1>")]);
        let seen = generator.seen();
        let orch = orchestrator(generator, hosting.clone());

        let outcome = orch.run(&request(&server, 2)).await.unwrap();

        assert_eq!(outcome.response.message, "Application updated successfully for round 2");
        let calls = hosting.calls();
        assert!(!calls.iter().any(|c| c.starts_with("create_repository")));
        assert!(!calls.iter().any(|c| c.starts_with("configure_pages")));
        assert!(calls.contains(&"move_branch gh-pages commit-1 force=true".to_string()));

        let requirements = seen.lock().unwrap().clone();
        assert_eq!(requirements.len(), 1);
        let existing = requirements[0].existing_files.as_ref().unwrap();
        assert_eq!(existing["index.html"], "<h1>v1</h1>");
        assert_eq!(
            requirements[0].update_instructions.as_deref(),
            Some("Update the application based on round 2 requirements")
        );

        // Update rounds do not stamp the README.
        assert!(!hosting.committed_files().contains_key("README.md"));
    }

    #[tokio::test]
    async fn test_update_of_missing_repository_fails() {
        let server = MockServer::start().await;
        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::files(&[("a", "b")]), hosting);

        let err = orch.run(&request(&server, 2)).await.unwrap_err();

        assert!(err.to_string().starts_with("Failed to update application: "));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_generation_failure_commits_default_files() {
        let server = MockServer::start().await;
        live_site_and_evaluator(&server).await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::text("I cannot help with that"), hosting.clone());

        let outcome = orch.run(&request(&server, 1)).await.unwrap();

        assert!(outcome.used_fallback);
        let committed = hosting.committed_files();
        assert_eq!(committed.len(), 3);
        assert!(committed.contains_key("app.js"));
    }

    #[tokio::test]
    async fn test_liveness_and_notification_failures_do_not_fail_the_build() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::files(&[("index.html", "x")]), hosting);

        let outcome = orch.run(&request(&server, 1)).await.unwrap();

        assert_eq!(outcome.response.status, "success");
        assert_eq!(outcome.liveness, PollOutcome::TimedOut { attempts: 3 });
        assert_eq!(outcome.delivery, DeliveryOutcome::Exhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_hosting_failure_is_a_pipeline_failure() {
        let server = MockServer::start().await;
        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        hosting.fail_commits();
        let orch = orchestrator(FakeGenerator::files(&[("index.html", "x")]), hosting.clone());

        let err = orch.run(&request(&server, 1)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to build application: API error: tree rejected"
        );
        assert!(!hosting.calls().iter().any(|c| c.starts_with("move_branch")));
    }

    #[tokio::test]
    async fn test_artifact_urls_use_slug() {
        let server = MockServer::start().await;
        let hosting = Arc::new(FakeHosting::new(&server.uri()));
        let orch = orchestrator(FakeGenerator::files(&[]), hosting);

        let urls = orch.artifact_urls("My Cool App!").await.unwrap();
        assert_eq!(urls.repo_url, "https://github.com/octo/my-cool-app-");
        assert_eq!(urls.pages_url, "https://octo.github.io/my-cool-app-/");
    }
}
