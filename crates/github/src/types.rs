use serde::{Deserialize, Serialize};

// =============================================================================
// Repositories
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRepoRequest {
    pub name: String,
    pub description: String,
    pub private: bool,
}

impl CreateRepoRequest {
    pub fn public(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            private: false,
        }
    }
}

/// A repository on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedRepository {
    pub owner: String,
    pub name: String,
    pub html_url: String,
    /// Where the published site is served.
    pub pages_url: String,
    pub default_branch: String,
}

impl HostedRepository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Repository and site URLs of an artifact, known before it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUrls {
    pub repo_url: String,
    pub pages_url: String,
}

pub fn repo_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{}/{}", owner, name)
}

pub fn pages_url(owner: &str, name: &str) -> String {
    format!("https://{}.github.io/{}/", owner, name)
}

// =============================================================================
// REST payloads
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct NewRepository<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub private: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryResponse {
    pub name: String,
    pub html_url: String,
    pub owner: OwnerResponse,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerResponse {
    pub login: String,
}

impl RepositoryResponse {
    pub fn into_hosted(self) -> HostedRepository {
        HostedRepository {
            pages_url: pages_url(&self.owner.login, &self.name),
            owner: self.owner.login,
            name: self.name,
            html_url: self.html_url,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefResponse {
    pub object: GitObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitResponse {
    pub tree: GitObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewBlob<'a> {
    pub content: &'a str,
    pub encoding: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewTree {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_tree: Option<String>,
    pub tree: Vec<TreeEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewCommit<'a> {
    pub message: &'a str,
    pub tree: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRef<'a> {
    pub sha: &'a str,
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PagesConfig<'a> {
    pub source: PagesSource<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PagesSource<'a> {
    pub branch: &'a str,
    pub path: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_urls() {
        assert_eq!(pages_url("octo", "todo-list"), "https://octo.github.io/todo-list/");
        assert_eq!(repo_url("octo", "todo-list"), "https://github.com/octo/todo-list");
    }

    #[test]
    fn test_repository_response_into_hosted() {
        let json = r#"{"name": "app", "html_url": "https://github.com/o/app", "owner": {"login": "o"}}"#;
        let repo: RepositoryResponse = serde_json::from_str(json).unwrap();
        let hosted = repo.into_hosted();

        assert_eq!(hosted.default_branch, "main");
        assert_eq!(hosted.pages_url, "https://o.github.io/app/");
        assert_eq!(hosted.full_name(), "o/app");
    }

    #[test]
    fn test_tree_entry_serialization() {
        let tree = NewTree {
            base_tree: None,
            tree: vec![TreeEntry {
                path: "index.html".to_string(),
                mode: "100644",
                kind: "blob",
                sha: "abc".to_string(),
            }],
        };

        let json = serde_json::to_value(&tree).unwrap();
        assert!(json.get("base_tree").is_none());
        assert_eq!(json["tree"][0]["type"], "blob");
        assert_eq!(json["tree"][0]["mode"], "100644");
    }
}
