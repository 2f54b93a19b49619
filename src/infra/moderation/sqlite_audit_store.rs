// SQLite-backed audit trail and submission history.
//
// Tables:
// - moderation_audit: append-only record of every decision
// - submission_history: per-author trace used for behaviour scoring

use crate::core::moderation::{
    AuditRecord, AuditSink, ModerationError, ModerationStatus, SubmissionHistory,
    SubmissionRecord, SubmissionType,
};
use crate::infra::db::{from_db_time, to_db_time};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

impl SqliteAuditStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                submission_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                submission_type TEXT NOT NULL,
                status TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasons TEXT NOT NULL DEFAULT '[]',
                signals TEXT,
                recorded_at TEXT NOT NULL,
                system_version TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_audit_submission
                ON moderation_audit(submission_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS submission_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                submission_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                content_hash INTEGER NOT NULL,
                submitted_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submission_history_author
                ON submission_history(author_id, submitted_at);
            DELETE FROM submission_history
                WHERE id NOT IN (
                    SELECT MIN(id) FROM submission_history GROUP BY submission_id
                );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_submission_history_submission
                ON submission_history(submission_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }

    /// All audit entries for one submission, oldest first.
    pub async fn records_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<AuditRecord>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM moderation_audit
            WHERE submission_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        rows.iter().map(Self::map_audit).collect()
    }

    fn map_audit(row: &SqliteRow) -> Result<AuditRecord, ModerationError> {
        let submission_type: String = row.get("submission_type");
        let status: String = row.get("status");
        let reasons: String = row.get("reasons");
        let signals: Option<String> = row.get("signals");
        let recorded_at: String = row.get("recorded_at");

        let submission_type: SubmissionType =
            serde_json::from_value(serde_json::Value::String(submission_type.clone())).map_err(
                |_| {
                    ModerationError::StorageError(format!(
                        "unknown submission type {:?}",
                        submission_type
                    ))
                },
            )?;
        let status = ModerationStatus::parse(&status).ok_or_else(|| {
            ModerationError::StorageError(format!("unknown moderation status {:?}", status))
        })?;
        let reasons = serde_json::from_str(&reasons)
            .map_err(|e| ModerationError::StorageError(format!("bad reasons column: {}", e)))?;
        let signals = signals
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| ModerationError::StorageError(format!("bad signals column: {}", e)))?;
        let recorded_at = from_db_time(&recorded_at)
            .map_err(|e| ModerationError::StorageError(format!("bad recorded_at: {}", e)))?;

        Ok(AuditRecord {
            submission_id: row.get("submission_id"),
            author_id: row.get("author_id"),
            submission_type,
            status,
            confidence: row.get("confidence"),
            reasons,
            signals,
            recorded_at,
            system_version: row.get("system_version"),
        })
    }

    /// Drop history older than the cutoff (called periodically).
    pub async fn cleanup_history(&self, older_than: DateTime<Utc>) -> Result<u64, ModerationError> {
        let result = sqlx::query("DELETE FROM submission_history WHERE submitted_at < ?")
            .bind(to_db_time(older_than))
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditStore {
    async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError> {
        let reasons = serde_json::to_string(&record.reasons)
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        let signals = record
            .signals
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO moderation_audit (
                submission_id, author_id, submission_type, status, confidence,
                reasons, signals, recorded_at, system_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.submission_id)
        .bind(&record.author_id)
        .bind(record.submission_type.to_string())
        .bind(record.status.as_str())
        .bind(record.confidence)
        .bind(reasons)
        .bind(signals)
        .bind(to_db_time(record.recorded_at))
        .bind(&record.system_version)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionHistory for SqliteAuditStore {
    async fn record_submission(&self, record: SubmissionRecord) -> Result<(), ModerationError> {
        // Re-moderating a submission keeps its first trace
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO submission_history (
                submission_id, author_id, content_hash, submitted_at
            )
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.submission_id)
        .bind(&record.author_id)
        .bind(record.content_hash as i64)
        .bind(to_db_time(record.submitted_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn recent_submissions(
        &self,
        author_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SubmissionRecord>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT submission_id, author_id, content_hash, submitted_at
            FROM submission_history
            WHERE author_id = ? AND submitted_at >= ?
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(author_id)
        .bind(to_db_time(since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let submitted_at: String = row.get("submitted_at");
                Ok(SubmissionRecord {
                    submission_id: row.get("submission_id"),
                    author_id: row.get("author_id"),
                    content_hash: row.get::<i64, _>("content_hash") as u64,
                    submitted_at: from_db_time(&submitted_at).map_err(|e| {
                        ModerationError::StorageError(format!("bad submitted_at: {}", e))
                    })?,
                })
            })
            .collect()
    }
}
