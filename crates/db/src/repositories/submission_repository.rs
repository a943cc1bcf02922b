use crate::error::DbError;
use crate::models::{EvaluationRow, SubmissionRow};
use appforge_core::{
    EvaluationEntry, EvaluationFilter, EvaluationRecord, EvaluationResult, Page, Paginated,
    Submission, SubmissionFilter,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outcome of one webhook delivery written to the ledger.
#[derive(Debug, Clone)]
pub struct RecordedEvaluation {
    pub submission: Submission,
    pub evaluation: EvaluationResult,
    /// False when the submission already existed and was updated in place.
    pub created: bool,
}

/// The submission ledger: submissions plus their append-only evaluation results.
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: SqlitePool,
}

impl SubmissionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts the submission for (email, task, round, nonce) and appends one
    /// evaluation result, in a single transaction.
    pub async fn record_evaluation(
        &self,
        record: &EvaluationRecord,
    ) -> Result<RecordedEvaluation, DbError> {
        let result = self.record_evaluation_inner(record).await;
        if let Err(e) = &result {
            error!(
                email = %record.email,
                task = %record.task,
                round = record.round,
                error = %e,
                "Failed to persist evaluation, transaction rolled back"
            );
        }
        result
    }

    async fn record_evaluation_inner(
        &self,
        record: &EvaluationRecord,
    ) -> Result<RecordedEvaluation, DbError> {
        let now = Utc::now().timestamp();
        let candidate_id = Uuid::new_v4().to_string();
        let feedback = record
            .feedback
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        let submission: SubmissionRow = sqlx::query_as(
            r#"
            INSERT INTO submissions (id, email, task, round, nonce, repo_url, pages_url, commit_sha, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (email, task, round, nonce) DO UPDATE SET
                repo_url = excluded.repo_url,
                pages_url = excluded.pages_url,
                commit_sha = excluded.commit_sha,
                updated_at = excluded.updated_at
            RETURNING id, email, task, round, nonce, repo_url, pages_url, commit_sha, created_at
            "#,
        )
        .bind(&candidate_id)
        .bind(&record.email)
        .bind(&record.task)
        .bind(i64::from(record.round))
        .bind(&record.nonce)
        .bind(&record.repo_url)
        .bind(&record.pages_url)
        .bind(&record.commit_sha)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let created = submission.id == candidate_id;
        let evaluation_id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO evaluation_results (id, submission_id, status, score, feedback, passed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&evaluation_id)
        .bind(&submission.id)
        .bind(&record.status)
        .bind(record.score)
        .bind(&feedback)
        .bind(record.passed)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            submission_id = %submission.id,
            evaluation_id = %evaluation_id,
            created,
            passed = record.passed,
            "Recorded evaluation"
        );

        let evaluation = EvaluationRow {
            id: evaluation_id,
            submission_id: submission.id.clone(),
            status: record.status.clone(),
            score: record.score,
            feedback,
            passed: record.passed,
            created_at: now,
            email: None,
            task: None,
            round: None,
        }
        .into_domain();

        Ok(RecordedEvaluation {
            submission: submission.into_domain(),
            evaluation,
            created,
        })
    }

    pub async fn find_by_key(
        &self,
        email: &str,
        task: &str,
        round: u32,
        nonce: &str,
    ) -> Result<Option<Submission>, DbError> {
        let row: Option<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT id, email, task, round, nonce, repo_url, pages_url, commit_sha, created_at
            FROM submissions
            WHERE email = ? AND task = ? AND round = ? AND nonce = ?
            "#,
        )
        .bind(email)
        .bind(task)
        .bind(i64::from(round))
        .bind(nonce)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn evaluations_for(&self, submission_id: Uuid) -> Result<Vec<EvaluationResult>, DbError> {
        let rows: Vec<EvaluationRow> = sqlx::query_as(
            r#"
            SELECT id, submission_id, status, score, feedback, passed, created_at
            FROM evaluation_results
            WHERE submission_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(submission_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Most recent submissions first.
    pub async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
        page: Page,
    ) -> Result<Paginated<Submission>, DbError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM submissions s");
        push_filters(&mut count, filter.email.as_deref(), filter.task.as_deref(), None);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT s.id, s.email, s.task, s.round, s.nonce, s.repo_url, s.pages_url, s.commit_sha, s.created_at FROM submissions s",
        );
        push_filters(&mut query, filter.email.as_deref(), filter.task.as_deref(), None);
        query.push(" ORDER BY s.created_at DESC, s.rowid DESC");
        push_page(&mut query, page);

        let rows: Vec<SubmissionRow> = query.build_query_as().fetch_all(&self.pool).await?;
        debug!(total, returned = rows.len(), "Listed submissions");

        Ok(Paginated {
            total: u64::try_from(total).unwrap_or_default(),
            items: rows.into_iter().map(|r| r.into_domain()).collect(),
        })
    }

    /// Most recent evaluations first, joined with their submission identity.
    pub async fn list_evaluations(
        &self,
        filter: &EvaluationFilter,
        page: Page,
    ) -> Result<Paginated<EvaluationEntry>, DbError> {
        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM evaluation_results e JOIN submissions s ON e.submission_id = s.id",
        );
        push_filters(
            &mut count,
            filter.email.as_deref(),
            filter.task.as_deref(),
            filter.round,
        );
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT e.id, e.submission_id, e.status, e.score, e.feedback, e.passed, e.created_at, s.email, s.task, s.round \
             FROM evaluation_results e JOIN submissions s ON e.submission_id = s.id",
        );
        push_filters(
            &mut query,
            filter.email.as_deref(),
            filter.task.as_deref(),
            filter.round,
        );
        query.push(" ORDER BY e.created_at DESC, e.rowid DESC");
        push_page(&mut query, page);

        let rows: Vec<EvaluationRow> = query.build_query_as().fetch_all(&self.pool).await?;
        debug!(total, returned = rows.len(), "Listed evaluations");

        Ok(Paginated {
            total: u64::try_from(total).unwrap_or_default(),
            items: rows.into_iter().map(|r| r.into_entry()).collect(),
        })
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    email: Option<&str>,
    task: Option<&str>,
    round: Option<u32>,
) {
    let mut separator = " WHERE ";

    if let Some(email) = email {
        builder.push(separator).push("s.email = ").push_bind(email.to_string());
        separator = " AND ";
    }
    if let Some(task) = task {
        builder.push(separator).push("s.task = ").push_bind(task.to_string());
        separator = " AND ";
    }
    if let Some(round) = round {
        builder.push(separator).push("s.round = ").push_bind(i64::from(round));
    }
}

fn push_page(builder: &mut QueryBuilder<'_, Sqlite>, page: Page) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(page.offset));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn record(email: &str, task: &str, round: u32, nonce: &str) -> EvaluationRecord {
        EvaluationRecord {
            email: email.to_string(),
            task: task.to_string(),
            round,
            nonce: nonce.to_string(),
            repo_url: format!("https://github.com/octo/{}", task),
            pages_url: format!("https://octo.github.io/{}/", task),
            commit_sha: "sha-1".to_string(),
            status: "completed".to_string(),
            score: Some(87.5),
            feedback: Some(json!({"checks": {"title": true}})),
            passed: true,
        }
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_creates_submission_and_result() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool.clone());

        let recorded = repo
            .record_evaluation(&record("a@b.c", "todo-list", 1, "n1"))
            .await
            .unwrap();

        assert!(recorded.created);
        assert_eq!(recorded.submission.task, "todo-list");
        assert_eq!(recorded.evaluation.submission_id, recorded.submission.id);
        assert_eq!(recorded.evaluation.score, Some(87.5));
        assert_eq!(
            recorded.evaluation.feedback,
            Some(json!({"checks": {"title": true}}))
        );
        assert_eq!(count(&pool, "submissions").await, 1);
        assert_eq!(count(&pool, "evaluation_results").await, 1);
    }

    #[tokio::test]
    async fn test_redelivery_upserts_submission_and_appends_result() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool.clone());

        let first = repo
            .record_evaluation(&record("a@b.c", "todo-list", 1, "n1"))
            .await
            .unwrap();

        let mut second = record("a@b.c", "todo-list", 1, "n1");
        second.repo_url = "https://github.com/octo/todo-list-2".to_string();
        second.pages_url = "https://octo.github.io/todo-list-2/".to_string();
        second.commit_sha = "sha-2".to_string();
        second.passed = false;
        let second = repo.record_evaluation(&second).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.submission.id, first.submission.id);
        assert_eq!(second.submission.created_at, first.submission.created_at);
        assert_eq!(count(&pool, "submissions").await, 1);
        assert_eq!(count(&pool, "evaluation_results").await, 2);

        let stored = repo
            .find_by_key("a@b.c", "todo-list", 1, "n1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.repo_url, "https://github.com/octo/todo-list-2");
        assert_eq!(stored.pages_url, "https://octo.github.io/todo-list-2/");
        assert_eq!(stored.commit_sha, "sha-2");

        let evaluations = repo.evaluations_for(stored.id).await.unwrap();
        assert_eq!(evaluations.len(), 2);
        assert!(!evaluations[0].passed);
        assert!(evaluations[1].passed);
    }

    #[tokio::test]
    async fn test_different_nonce_is_a_new_submission() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool.clone());

        repo.record_evaluation(&record("a@b.c", "todo-list", 1, "n1"))
            .await
            .unwrap();
        let other = repo
            .record_evaluation(&record("a@b.c", "todo-list", 1, "n2"))
            .await
            .unwrap();

        assert!(other.created);
        assert_eq!(count(&pool, "submissions").await, 2);
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_no_partial_writes() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool.clone());

        sqlx::query("DROP TABLE evaluation_results")
            .execute(&pool)
            .await
            .unwrap();

        let result = repo
            .record_evaluation(&record("a@b.c", "todo-list", 1, "n1"))
            .await;

        assert!(matches!(result, Err(DbError::Sqlx(_))));
        assert_eq!(count(&pool, "submissions").await, 0);
    }

    #[tokio::test]
    async fn test_list_submissions_filters_and_paginates() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool);

        repo.record_evaluation(&record("a@b.c", "alpha", 1, "n1")).await.unwrap();
        repo.record_evaluation(&record("a@b.c", "beta", 1, "n2")).await.unwrap();
        repo.record_evaluation(&record("x@y.z", "alpha", 1, "n3")).await.unwrap();

        let all = repo
            .list_submissions(&SubmissionFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[0].nonce, "n3");
        assert_eq!(all.items[2].nonce, "n1");

        let by_email = repo
            .list_submissions(
                &SubmissionFilter {
                    email: Some("a@b.c".to_string()),
                    task: None,
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_email.total, 2);

        let paged = repo
            .list_submissions(
                &SubmissionFilter {
                    email: None,
                    task: Some("alpha".to_string()),
                },
                Page::new(Some(1), Some(1)).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(paged.total, 2);
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.items[0].nonce, "n1");
    }

    #[tokio::test]
    async fn test_list_evaluations_joins_submission_identity() {
        let pool = setup_test_db().await;
        let repo = SubmissionRepository::new(pool);

        repo.record_evaluation(&record("a@b.c", "alpha", 1, "n1")).await.unwrap();
        repo.record_evaluation(&record("a@b.c", "alpha", 2, "n2")).await.unwrap();
        repo.record_evaluation(&record("a@b.c", "alpha", 2, "n2")).await.unwrap();

        let round_two = repo
            .list_evaluations(
                &EvaluationFilter {
                    email: Some("a@b.c".to_string()),
                    task: Some("alpha".to_string()),
                    round: Some(2),
                },
                Page::default(),
            )
            .await
            .unwrap();

        assert_eq!(round_two.total, 2);
        assert!(round_two.items.iter().all(|e| e.round == 2));
        assert_eq!(round_two.items[0].email, "a@b.c");
        assert_eq!(round_two.items[0].task, "alpha");
    }
}
