use appforge_core::FileMap;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{is_already_exists, status_of, GitHubError, Result};
use crate::traits::HostingProvider;
use crate::types::{
    CommitResponse, CreateRepoRequest, HostedRepository, NewBlob, NewCommit, NewRef,
    NewRepository, NewTree, PagesConfig, PagesSource, RefResponse, RepositoryResponse, TreeEntry,
    UpdateRef,
};

const FILE_MODE: &str = "100644";

pub struct GitHubClient {
    octocrab: Octocrab,
    org: Option<String>,
    owner: OnceCell<String>,
}

impl GitHubClient {
    /// Repositories are created under `org` when set, otherwise under the
    /// token's user.
    pub fn new(token: &str, org: Option<String>) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        Ok(Self::with_octocrab(octocrab, org))
    }

    pub fn with_octocrab(octocrab: Octocrab, org: Option<String>) -> Self {
        Self {
            octocrab,
            org: org.filter(|o| !o.trim().is_empty()),
            owner: OnceCell::new(),
        }
    }

    fn repo_route(repo: &HostedRepository, suffix: &str) -> String {
        format!("/repos/{}/{}{}", repo.owner, repo.name, suffix)
    }

    async fn post_json<B, R>(&self, route: String, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response: R = self.octocrab.post(route, Some(body)).await?;
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl ContentEntry {
    fn decoded(&self) -> Option<String> {
        if self.encoding.as_deref() != Some("base64") {
            return None;
        }
        let cleaned: String = self
            .content
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD.decode(cleaned).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[derive(Debug, Serialize)]
struct NewFile<'a> {
    message: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[async_trait]
impl HostingProvider for GitHubClient {
    async fn owner(&self) -> Result<String> {
        let owner = self
            .owner
            .get_or_try_init(|| async {
                if let Some(org) = &self.org {
                    return Ok(org.clone());
                }
                let user: UserResponse = self.octocrab.get("/user", None::<&()>).await?;
                debug!("Resolved GitHub owner from token: {}", user.login);
                Ok::<_, GitHubError>(user.login)
            })
            .await?;

        Ok(owner.clone())
    }

    async fn create_repository(&self, request: &CreateRepoRequest) -> Result<HostedRepository> {
        info!("Creating repository: {}", request.name);

        let route = match &self.org {
            Some(org) => format!("/orgs/{}/repos", org),
            None => "/user/repos".to_string(),
        };
        let body = NewRepository {
            name: &request.name,
            description: &request.description,
            private: request.private,
        };

        let result: std::result::Result<RepositoryResponse, octocrab::Error> =
            self.octocrab.post(route, Some(&body)).await;

        match result {
            Ok(repo) => Ok(repo.into_hosted()),
            Err(e) if is_already_exists(&e) => Err(GitHubError::RepoAlreadyExists {
                name: request.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_repository(&self, name: &str) -> Result<HostedRepository> {
        let owner = self.owner().await?;
        debug!("Getting repository {}/{}", owner, name);

        let repo: RepositoryResponse = self
            .octocrab
            .get(format!("/repos/{}/{}", owner, name), None::<&()>)
            .await?;

        Ok(repo.into_hosted())
    }

    async fn put_file(
        &self,
        repo: &HostedRepository,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<()> {
        debug!("Creating {} in {}", path, repo.full_name());

        let body = NewFile {
            message,
            content: STANDARD.encode(content),
        };
        let _: serde_json::Value = self
            .octocrab
            .put(Self::repo_route(repo, &format!("/contents/{}", path)), Some(&body))
            .await?;

        Ok(())
    }

    async fn list_files(&self, repo: &HostedRepository) -> Result<FileMap> {
        let listing: std::result::Result<Vec<ContentEntry>, octocrab::Error> = self
            .octocrab
            .get(Self::repo_route(repo, "/contents"), None::<&()>)
            .await;

        let listing = match listing {
            Ok(entries) => entries,
            // An empty repository has no contents endpoint yet.
            Err(e) if status_of(&e) == Some(404) => return Ok(FileMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = FileMap::new();
        for entry in listing.into_iter().filter(|e| e.kind == "file") {
            let file: ContentEntry = self
                .octocrab
                .get(
                    Self::repo_route(repo, &format!("/contents/{}", entry.path)),
                    None::<&()>,
                )
                .await?;

            match file.decoded() {
                Some(text) => {
                    files.insert(entry.path, text);
                }
                None => debug!("Skipping non-text file {}", entry.path),
            }
        }

        debug!("Listed {} files in {}", files.len(), repo.full_name());
        Ok(files)
    }

    async fn branch_head(&self, repo: &HostedRepository, branch: &str) -> Result<Option<String>> {
        let result: std::result::Result<RefResponse, octocrab::Error> = self
            .octocrab
            .get(
                Self::repo_route(repo, &format!("/git/ref/heads/{}", branch)),
                None::<&()>,
            )
            .await;

        match result {
            Ok(reference) => Ok(Some(reference.object.sha)),
            // 409 means the repository has no commits at all.
            Err(e) if matches!(status_of(&e), Some(404) | Some(409)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_branch(&self, repo: &HostedRepository, branch: &str, sha: &str) -> Result<()> {
        info!("Creating branch {} at {} in {}", branch, sha, repo.full_name());

        let body = NewRef {
            reference: format!("refs/heads/{}", branch),
            sha: sha.to_string(),
        };
        let _: serde_json::Value = self
            .post_json(Self::repo_route(repo, "/git/refs"), &body)
            .await?;

        Ok(())
    }

    async fn create_commit(
        &self,
        repo: &HostedRepository,
        files: &FileMap,
        message: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        let base_tree = match parent {
            Some(sha) => {
                let commit: CommitResponse = self
                    .octocrab
                    .get(
                        Self::repo_route(repo, &format!("/git/commits/{}", sha)),
                        None::<&()>,
                    )
                    .await?;
                Some(commit.tree.sha)
            }
            None => None,
        };

        let mut tree = Vec::with_capacity(files.len());
        for (path, content) in files {
            let blob: CommitSha = self
                .post_json(
                    Self::repo_route(repo, "/git/blobs"),
                    &NewBlob {
                        content,
                        encoding: "utf-8",
                    },
                )
                .await?;
            tree.push(TreeEntry {
                path: path.clone(),
                mode: FILE_MODE,
                kind: "blob",
                sha: blob.sha,
            });
        }

        let tree: CommitSha = self
            .post_json(
                Self::repo_route(repo, "/git/trees"),
                &NewTree { base_tree, tree },
            )
            .await?;

        let commit: CommitSha = self
            .post_json(
                Self::repo_route(repo, "/git/commits"),
                &NewCommit {
                    message,
                    tree: tree.sha,
                    parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
                },
            )
            .await?;

        info!(
            "Created commit {} with {} files in {}",
            commit.sha,
            files.len(),
            repo.full_name()
        );
        Ok(commit.sha)
    }

    async fn move_branch(
        &self,
        repo: &HostedRepository,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()> {
        debug!("Moving {} to {} in {} (force: {})", branch, sha, repo.full_name(), force);

        let _: serde_json::Value = self
            .octocrab
            .patch(
                Self::repo_route(repo, &format!("/git/refs/heads/{}", branch)),
                Some(&UpdateRef { sha, force }),
            )
            .await?;

        Ok(())
    }

    async fn configure_pages(&self, repo: &HostedRepository, branch: &str, path: &str) -> Result<()> {
        let route = Self::repo_route(repo, "/pages");
        let body = PagesConfig {
            source: PagesSource { branch, path },
        };

        let created = match self.octocrab._post(route.as_str(), Some(&body)).await {
            Ok(response) => response.status(),
            Err(e) => {
                warn!("Pages creation request for {} failed: {}", repo.full_name(), e);
                return Ok(());
            }
        };

        if created.is_success() {
            info!("Enabled Pages for {} from {}:{}", repo.full_name(), branch, path);
            return Ok(());
        }

        // Pages already enabled: update the source instead.
        match self.octocrab._put(route.as_str(), Some(&body)).await {
            Ok(response) if response.status().is_success() => {
                info!("Updated Pages source for {} to {}:{}", repo.full_name(), branch, path);
            }
            Ok(response) => {
                warn!(
                    "Pages configuration for {} returned {}",
                    repo.full_name(),
                    response.status()
                );
            }
            Err(e) => warn!("Pages configuration for {} failed: {}", repo.full_name(), e),
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CommitSha {
    sha: String,
}
