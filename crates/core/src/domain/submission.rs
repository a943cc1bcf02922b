use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CoreError;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// One deployed round, keyed by (email, task, round, nonce).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    pub id: Uuid,
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: String,
    pub created_at: DateTime<Utc>,
}

/// An evaluator verdict; immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationResult {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub status: String,
    pub score: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub feedback: Option<serde_json::Value>,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

/// Evaluation result joined with the identity of its submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationEntry {
    pub id: Uuid,
    pub email: String,
    pub task: String,
    pub round: u32,
    pub status: String,
    pub score: Option<f64>,
    pub passed: bool,
    #[schema(value_type = Option<Object>)]
    pub feedback: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Inbound evaluator webhook.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluationWebhook {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    pub secret: String,
    pub status: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub feedback: Option<serde_json::Value>,
    pub passed: bool,
}

impl fmt::Debug for EvaluationWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationWebhook")
            .field("email", &self.email)
            .field("task", &self.task)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("commit_sha", &self.commit_sha)
            .field("secret", &"<redacted>")
            .field("status", &self.status)
            .field("passed", &self.passed)
            .finish_non_exhaustive()
    }
}

impl EvaluationWebhook {
    pub fn into_record(self) -> EvaluationRecord {
        EvaluationRecord {
            email: self.email,
            task: self.task,
            round: self.round,
            nonce: self.nonce,
            repo_url: self.repo_url,
            pages_url: self.pages_url,
            commit_sha: self.commit_sha,
            status: self.status,
            score: self.score,
            feedback: self.feedback,
            passed: self.passed,
        }
    }
}

/// Everything the ledger persists for one webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: String,
    pub status: String,
    pub score: Option<f64>,
    pub feedback: Option<serde_json::Value>,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub email: Option<String>,
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationFilter {
    pub email: Option<String>,
    pub task: Option<String>,
    pub round: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Result<Self, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(CoreError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_LIMIT, limit
            )));
        }

        Ok(Self {
            limit,
            offset: offset.unwrap_or(0),
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub total: u64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::new(None, None).unwrap(), Page::default());
        assert_eq!(Page::new(Some(200), Some(10)).unwrap().offset, 10);
        assert!(Page::new(Some(0), None).is_err());
        assert!(Page::new(Some(201), None).is_err());
    }

    #[test]
    fn test_webhook_into_record() {
        let json = r#"{
            "email": "a@b.c",
            "task": "todo list",
            "round": 1,
            "nonce": "n-1",
            "repo_url": "https://github.com/o/todo-list",
            "commit_sha": "abc",
            "pages_url": "https://o.github.io/todo-list/",
            "secret": "webhook-secret",
            "status": "completed",
            "passed": true
        }"#;

        let webhook: EvaluationWebhook = serde_json::from_str(json).unwrap();
        let rendered = format!("{:?}", webhook);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("webhook-secret"));

        let record = webhook.into_record();

        assert_eq!(record.task, "todo list");
        assert!(record.passed);
        assert!(record.score.is_none());
        assert!(record.feedback.is_none());
    }
}
