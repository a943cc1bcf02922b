//! In-memory generation and hosting backends for pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use appforge_core::{FileMap, RequirementsDocument};
use async_trait::async_trait;
use github::{repo_url, CreateRepoRequest, GitHubError, HostedRepository, HostingProvider};
use llm::{GenerationBackend, GenerationResult};

pub const OWNER: &str = "octo";

/// Returns a canned completion and records every requirements document.
pub struct FakeGenerator {
    output: String,
    seen: Arc<Mutex<Vec<RequirementsDocument>>>,
}

impl FakeGenerator {
    pub fn text(output: &str) -> Self {
        Self {
            output: output.to_string(),
            seen: Arc::default(),
        }
    }

    pub fn files(files: &[(&str, &str)]) -> Self {
        let map: FileMap = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        Self::text(&serde_json::to_string(&map).unwrap())
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<RequirementsDocument>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, requirements: &RequirementsDocument) -> GenerationResult<String> {
        self.seen.lock().unwrap().push(requirements.clone());
        Ok(self.output.clone())
    }
}

#[derive(Default)]
struct FakeRepo {
    branches: HashMap<String, String>,
    files: FileMap,
}

#[derive(Default)]
struct FakeState {
    repos: HashMap<String, FakeRepo>,
    calls: Vec<String>,
    commits: u32,
    committed: FileMap,
    fail_commits: bool,
}

/// In-memory host whose sites are served under `base_url`.
pub struct FakeHosting {
    base_url: String,
    state: Mutex<FakeState>,
}

impl FakeHosting {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            state: Mutex::default(),
        }
    }

    pub fn add_repository(&self, name: &str, tip: Option<&str>, with_pages: bool) {
        let mut repo = FakeRepo::default();
        if let Some(tip) = tip {
            repo.branches.insert("main".to_string(), tip.to_string());
        }
        if with_pages {
            repo.branches
                .insert("gh-pages".to_string(), tip.unwrap_or("pages").to_string());
        }
        self.state.lock().unwrap().repos.insert(name.to_string(), repo);
    }

    pub fn set_files(&self, name: &str, files: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let repo = state.repos.entry(name.to_string()).or_default();
        for (path, content) in files {
            repo.files.insert(path.to_string(), content.to_string());
        }
    }

    pub fn fail_commits(&self) {
        self.state.lock().unwrap().fail_commits = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn committed_files(&self) -> FileMap {
        self.state.lock().unwrap().committed.clone()
    }

    fn hosted(&self, name: &str) -> HostedRepository {
        HostedRepository {
            owner: OWNER.to_string(),
            name: name.to_string(),
            html_url: repo_url(OWNER, name),
            pages_url: format!("{}/{}/", self.base_url, name),
            default_branch: "main".to_string(),
        }
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

fn missing(name: &str) -> GitHubError {
    GitHubError::NotFound(format!("repository {}", name))
}

#[async_trait]
impl HostingProvider for FakeHosting {
    async fn owner(&self) -> github::Result<String> {
        Ok(OWNER.to_string())
    }

    async fn create_repository(&self, request: &CreateRepoRequest) -> github::Result<HostedRepository> {
        let mut state = self.record(format!("create_repository {}", request.name));
        if state.repos.contains_key(&request.name) {
            return Err(GitHubError::RepoAlreadyExists {
                name: request.name.clone(),
            });
        }
        state.repos.insert(request.name.clone(), FakeRepo::default());
        Ok(self.hosted(&request.name))
    }

    async fn get_repository(&self, name: &str) -> github::Result<HostedRepository> {
        let state = self.record(format!("get_repository {}", name));
        if !state.repos.contains_key(name) {
            return Err(missing(name));
        }
        Ok(self.hosted(name))
    }

    async fn put_file(
        &self,
        repo: &HostedRepository,
        path: &str,
        _message: &str,
        content: &str,
    ) -> github::Result<()> {
        let mut state = self.record(format!("put_file {}", path));
        let entry = state.repos.get_mut(&repo.name).ok_or_else(|| missing(&repo.name))?;
        entry
            .branches
            .entry("main".to_string())
            .or_insert_with(|| "seed".to_string());
        entry.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list_files(&self, repo: &HostedRepository) -> github::Result<FileMap> {
        let state = self.record("list_files".to_string());
        Ok(state
            .repos
            .get(&repo.name)
            .map(|r| r.files.clone())
            .unwrap_or_default())
    }

    async fn branch_head(&self, repo: &HostedRepository, branch: &str) -> github::Result<Option<String>> {
        let state = self.record(format!("branch_head {}", branch));
        Ok(state
            .repos
            .get(&repo.name)
            .and_then(|r| r.branches.get(branch).cloned()))
    }

    async fn create_branch(&self, repo: &HostedRepository, branch: &str, sha: &str) -> github::Result<()> {
        let mut state = self.record(format!("create_branch {} {}", branch, sha));
        let entry = state.repos.get_mut(&repo.name).ok_or_else(|| missing(&repo.name))?;
        entry.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_commit(
        &self,
        _repo: &HostedRepository,
        files: &FileMap,
        _message: &str,
        parent: Option<&str>,
    ) -> github::Result<String> {
        let mut state = self.record(format!("create_commit parent={}", parent.unwrap_or("none")));
        if state.fail_commits {
            return Err(GitHubError::Api("tree rejected".to_string()));
        }
        state.commits += 1;
        state.committed = files.clone();
        Ok(format!("commit-{}", state.commits))
    }

    async fn move_branch(
        &self,
        repo: &HostedRepository,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> github::Result<()> {
        let mut state = self.record(format!("move_branch {} {} force={}", branch, sha, force));
        let entry = state.repos.get_mut(&repo.name).ok_or_else(|| missing(&repo.name))?;
        entry.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn configure_pages(&self, _repo: &HostedRepository, branch: &str, path: &str) -> github::Result<()> {
        self.record(format!("configure_pages {} {}", branch, path));
        Ok(())
    }
}
