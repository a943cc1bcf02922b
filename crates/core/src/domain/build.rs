use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

/// Relative file path → text content.
pub type FileMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    /// Name of the attachment file
    pub name: String,
    /// URL or data URI of the attachment
    pub url: String,
    /// MIME type of the attachment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Request to build (round 1) or update (round ≥ 2) an application.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct BuildRequest {
    pub email: String,
    pub secret: String,
    pub task: String,
    #[serde(default = "default_round")]
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    #[serde(default)]
    pub checks: Vec<String>,
    pub evaluation_url: String,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

fn default_round() -> u32 {
    1
}

impl fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRequest")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("task", &self.task)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("checks", &self.checks.len())
            .field("evaluation_url", &self.evaluation_url)
            .finish_non_exhaustive()
    }
}

impl BuildRequest {
    pub fn mode(&self) -> Result<BuildMode, CoreError> {
        BuildMode::from_round(self.round)
    }

    pub fn notice(&self, repo_url: &str, commit_sha: &str, pages_url: &str) -> EvaluatorNotice {
        EvaluatorNotice {
            email: self.email.clone(),
            task: self.task.clone(),
            round: self.round,
            nonce: self.nonce.clone(),
            repo_url: repo_url.to_string(),
            commit_sha: commit_sha.to_string(),
            pages_url: pages_url.to_string(),
        }
    }
}

/// Which flavour of the pipeline a round runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Round 1: create the repository and publish the site.
    Initial,
    /// Round ≥ 2: edit the files of the repository created in round 1.
    Update { round: u32 },
}

impl BuildMode {
    pub fn from_round(round: u32) -> Result<Self, CoreError> {
        match round {
            0 => Err(CoreError::InvalidRound(round)),
            1 => Ok(Self::Initial),
            round => Ok(Self::Update { round }),
        }
    }

    pub fn round(&self) -> u32 {
        match self {
            Self::Initial => 1,
            Self::Update { round } => *round,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Initial => "build",
            Self::Update { .. } => "update",
        }
    }
}

/// What the generation backend is asked to satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementsDocument {
    pub brief: String,
    pub checks: Vec<String>,
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_files: Option<FileMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_instructions: Option<String>,
}

impl RequirementsDocument {
    pub fn from_request(request: &BuildRequest) -> Self {
        Self {
            brief: request.brief.clone(),
            checks: request.checks.clone(),
            attachments: request.attachments.clone().unwrap_or_default(),
            existing_files: None,
            update_instructions: None,
        }
    }

    /// Attaches the current repository contents so the backend edits in place.
    pub fn with_existing_files(mut self, files: FileMap, round: u32) -> Self {
        self.existing_files = Some(files);
        self.update_instructions = Some(format!(
            "Update the application based on round {} requirements",
            round
        ));
        self
    }

    pub fn is_update(&self) -> bool {
        self.existing_files.is_some()
    }
}

/// Payload POSTed to the evaluator once a round is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorNotice {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuildResponse {
    /// Status of the operation
    pub status: String,
    /// Human-readable message about the operation
    pub message: String,
    /// URL of the hosting repository
    pub repo_url: String,
    /// URL of the published site
    pub pages_url: String,
    /// SHA of the latest commit
    pub commit_sha: Option<String>,
    /// Timestamp of the response
    pub timestamp: DateTime<Utc>,
}

impl BuildResponse {
    pub fn success(
        message: impl Into<String>,
        repo_url: impl Into<String>,
        pages_url: impl Into<String>,
        commit_sha: impl Into<String>,
    ) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            repo_url: repo_url.into(),
            pages_url: pages_url.into(),
            commit_sha: Some(commit_sha.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn queued(repo_url: impl Into<String>, pages_url: impl Into<String>) -> Self {
        Self {
            status: "queued".to_string(),
            message: "Build queued for processing".to_string(),
            repo_url: repo_url.into(),
            pages_url: pages_url.into(),
            commit_sha: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(round: u32) -> BuildRequest {
        BuildRequest {
            email: "student@example.com".to_string(),
            secret: "s3cret".to_string(),
            task: "todo list".to_string(),
            round,
            nonce: "abc".to_string(),
            brief: "A todo list".to_string(),
            checks: vec!["has a #todo element".to_string()],
            evaluation_url: "https://eval.example.com/notify".to_string(),
            attachments: None,
        }
    }

    #[test]
    fn test_build_mode_from_round() {
        assert_eq!(BuildMode::from_round(1), Ok(BuildMode::Initial));
        assert_eq!(BuildMode::from_round(2), Ok(BuildMode::Update { round: 2 }));
        assert_eq!(BuildMode::from_round(0), Err(CoreError::InvalidRound(0)));
        assert_eq!(BuildMode::Update { round: 3 }.round(), 3);
        assert_eq!(BuildMode::Initial.verb(), "build");
    }

    #[test]
    fn test_request_defaults() {
        let json = r#"{
            "email": "a@b.c",
            "secret": "x",
            "task": "t",
            "nonce": "n",
            "brief": "b",
            "evaluation_url": "http://localhost/e"
        }"#;

        let req: BuildRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.round, 1);
        assert!(req.checks.is_empty());
        assert!(req.attachments.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", request(1));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_requirements_document_for_update() {
        let mut existing = FileMap::new();
        existing.insert("index.html".to_string(), "<h1>v1</h1>".to_string());

        let doc = RequirementsDocument::from_request(&request(2)).with_existing_files(existing, 2);

        assert!(doc.is_update());
        assert_eq!(
            doc.update_instructions.as_deref(),
            Some("Update the application based on round 2 requirements")
        );

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["existing_files"]["index.html"], "<h1>v1</h1>");
    }

    #[test]
    fn test_requirements_document_omits_update_fields_for_round_one() {
        let doc = RequirementsDocument::from_request(&request(1));
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("existing_files").is_none());
        assert!(json.get("update_instructions").is_none());
        assert_eq!(json["checks"][0], "has a #todo element");
    }

    #[test]
    fn test_notice_carries_request_identity() {
        let notice = request(2).notice("https://github.com/o/todo-list", "abc123", "https://o.github.io/todo-list/");
        assert_eq!(notice.round, 2);
        assert_eq!(notice.nonce, "abc");
        assert_eq!(notice.commit_sha, "abc123");
    }
}
