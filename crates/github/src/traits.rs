use appforge_core::FileMap;
use async_trait::async_trait;

use crate::error::Result;
use crate::types::{pages_url, repo_url, ArtifactUrls, CreateRepoRequest, HostedRepository};

/// Operations the build pipeline needs from a repository host.
///
/// Branch and commit operations follow git data API semantics: a commit is
/// created from blobs and a tree first, and only then does a branch pointer
/// move to it.
#[async_trait]
pub trait HostingProvider: Send + Sync {
    /// Account that owns generated repositories.
    async fn owner(&self) -> Result<String>;

    /// URLs the artifact named `name` has, or will have once built.
    async fn artifact_urls(&self, name: &str) -> Result<ArtifactUrls> {
        let owner = self.owner().await?;
        Ok(ArtifactUrls {
            repo_url: repo_url(&owner, name),
            pages_url: pages_url(&owner, name),
        })
    }

    /// Fails with `GitHubError::RepoAlreadyExists` when the name is taken.
    async fn create_repository(&self, request: &CreateRepoRequest) -> Result<HostedRepository>;

    async fn get_repository(&self, name: &str) -> Result<HostedRepository>;

    /// Creates a file on the default branch through the contents API.
    async fn put_file(
        &self,
        repo: &HostedRepository,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<()>;

    /// Text files at the repository root on the default branch.
    async fn list_files(&self, repo: &HostedRepository) -> Result<FileMap>;

    /// Tip commit of a branch, or `None` if the branch does not exist.
    async fn branch_head(&self, repo: &HostedRepository, branch: &str) -> Result<Option<String>>;

    async fn create_branch(&self, repo: &HostedRepository, branch: &str, sha: &str) -> Result<()>;

    /// Writes one blob per file and a tree on top of `parent`'s tree, then a
    /// commit. Returns the new commit SHA without moving any branch.
    async fn create_commit(
        &self,
        repo: &HostedRepository,
        files: &FileMap,
        message: &str,
        parent: Option<&str>,
    ) -> Result<String>;

    async fn move_branch(
        &self,
        repo: &HostedRepository,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()>;

    /// Serves the site from `branch` at `path`. Idempotent.
    async fn configure_pages(&self, repo: &HostedRepository, branch: &str, path: &str) -> Result<()>;
}
