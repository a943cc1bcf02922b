use appforge_core::{EvaluationEntry, EvaluationResult, Submission};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: String,
    pub email: String,
    pub task: String,
    pub round: i64,
    pub nonce: String,
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: String,
    pub created_at: i64,
}

impl SubmissionRow {
    pub fn into_domain(self) -> Submission {
        Submission {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            email: self.email,
            task: self.task,
            round: u32::try_from(self.round).unwrap_or_default(),
            nonce: self.nonce,
            repo_url: self.repo_url,
            pages_url: self.pages_url,
            commit_sha: self.commit_sha,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

/// Evaluation result row, optionally joined with its submission identity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EvaluationRow {
    pub id: String,
    pub submission_id: String,
    pub status: String,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub passed: bool,
    pub created_at: i64,
    #[sqlx(default)]
    pub email: Option<String>,
    #[sqlx(default)]
    pub task: Option<String>,
    #[sqlx(default)]
    pub round: Option<i64>,
}

impl EvaluationRow {
    pub fn into_domain(self) -> EvaluationResult {
        EvaluationResult {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            submission_id: Uuid::parse_str(&self.submission_id).unwrap_or_default(),
            status: self.status,
            score: self.score,
            feedback: parse_feedback(self.feedback.as_deref()),
            passed: self.passed,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }

    pub fn into_entry(self) -> EvaluationEntry {
        EvaluationEntry {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            task: self.task.unwrap_or_default(),
            round: self
                .round
                .and_then(|r| u32::try_from(r).ok())
                .unwrap_or_default(),
            status: self.status,
            score: self.score,
            passed: self.passed,
            feedback: parse_feedback(self.feedback.as_deref()),
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

fn parse_feedback(raw: Option<&str>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(s).ok())
}

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}
