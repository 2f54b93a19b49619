// SQLite-backed review queue and appeals.
//
// Tables:
// - review_items: latest moderation result per submission (JSON), with the
//   status copied into its own column for queue queries
// - appeals: one row per submission that has been appealed

use crate::core::moderation::ModerationStatus;
use crate::core::review::{Appeal, AppealStatus, ReviewError, ReviewItem, ReviewStore};
use crate::infra::db::{from_db_time, to_db_time};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

#[derive(Clone)]
pub struct SqliteReviewStore {
    pool: Pool<Sqlite>,
}

impl SqliteReviewStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ReviewError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_items (
                submission_id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                status TEXT NOT NULL,
                queued_at TEXT NOT NULL,
                result TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_review_items_status
                ON review_items(status, queued_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS appeals (
                submission_id TEXT PRIMARY KEY,
                appellant_id TEXT NOT NULL,
                statement TEXT NOT NULL,
                filed_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                resolved_by TEXT,
                resolved_at TEXT,
                resolution_note TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        Ok(())
    }

    /// Conditional replace: only lands while the stored status is `expected`.
    async fn write_item(
        conn: &mut SqliteConnection,
        item: &ReviewItem,
        expected: ModerationStatus,
    ) -> Result<bool, ReviewError> {
        let result = serde_json::to_string(&item.result)
            .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE review_items
            SET author_id = ?, status = ?, queued_at = ?, result = ?
            WHERE submission_id = ? AND status = ?
            "#,
        )
        .bind(&item.author_id)
        .bind(item.result.status.as_str())
        .bind(to_db_time(item.queued_at))
        .bind(result)
        .bind(&item.result.submission_id)
        .bind(expected.as_str())
        .execute(conn)
        .await
        .map_err(storage_error)?;

        Ok(updated.rows_affected() == 1)
    }

    fn map_item(row: &SqliteRow) -> Result<ReviewItem, ReviewError> {
        let queued_at: String = row.get("queued_at");
        let result: String = row.get("result");

        Ok(ReviewItem {
            author_id: row.get("author_id"),
            queued_at: stored_time("queued_at", &queued_at)?,
            result: serde_json::from_str(&result)
                .map_err(|e| ReviewError::StorageError(e.to_string()))?,
        })
    }

    fn map_appeal(row: &SqliteRow) -> Result<Appeal, ReviewError> {
        let filed_at: String = row.get("filed_at");
        let status: String = row.get("status");
        let resolved_at: Option<String> = row.get("resolved_at");

        Ok(Appeal {
            submission_id: row.get("submission_id"),
            appellant_id: row.get("appellant_id"),
            statement: row.get("statement"),
            filed_at: stored_time("filed_at", &filed_at)?,
            status: AppealStatus::parse(&status).ok_or_else(|| {
                ReviewError::StorageError(format!("unknown appeal status {:?}", status))
            })?,
            resolved_by: row.get("resolved_by"),
            resolved_at: resolved_at
                .as_deref()
                .map(|value| stored_time("resolved_at", value))
                .transpose()?,
            resolution_note: row.get("resolution_note"),
        })
    }
}

fn stored_time(column: &str, value: &str) -> Result<DateTime<Utc>, ReviewError> {
    from_db_time(value)
        .map_err(|e| ReviewError::StorageError(format!("bad {} timestamp: {}", column, e)))
}

fn storage_error(e: sqlx::Error) -> ReviewError {
    ReviewError::StorageError(e.to_string())
}

#[async_trait]
impl ReviewStore for SqliteReviewStore {
    async fn insert_item(&self, item: &ReviewItem) -> Result<bool, ReviewError> {
        let result = serde_json::to_string(&item.result)
            .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO review_items (submission_id, author_id, status, queued_at, result)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(submission_id) DO NOTHING
            "#,
        )
        .bind(&item.result.submission_id)
        .bind(&item.author_id)
        .bind(item.result.status.as_str())
        .bind(to_db_time(item.queued_at))
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn update_item(
        &self,
        item: &ReviewItem,
        expected: ModerationStatus,
    ) -> Result<bool, ReviewError> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        Self::write_item(&mut *conn, item, expected).await
    }

    async fn get_item(&self, submission_id: &str) -> Result<Option<ReviewItem>, ReviewError> {
        let row = sqlx::query("SELECT * FROM review_items WHERE submission_id = ?")
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        row.as_ref().map(Self::map_item).transpose()
    }

    async fn list_by_status(
        &self,
        status: ModerationStatus,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, ReviewError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM review_items
            WHERE status = ?
            ORDER BY queued_at DESC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        rows.iter().map(Self::map_item).collect()
    }

    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), ReviewError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO appeals (
                submission_id, appellant_id, statement, filed_at, status,
                resolved_by, resolved_at, resolution_note
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(submission_id) DO NOTHING
            "#,
        )
        .bind(&appeal.submission_id)
        .bind(&appeal.appellant_id)
        .bind(&appeal.statement)
        .bind(to_db_time(appeal.filed_at))
        .bind(appeal.status.as_str())
        .bind(&appeal.resolved_by)
        .bind(appeal.resolved_at.map(to_db_time))
        .bind(&appeal.resolution_note)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if inserted.rows_affected() == 0 {
            return Err(ReviewError::DuplicateAppeal(appeal.submission_id.clone()));
        }
        Ok(())
    }

    async fn close_appeal(
        &self,
        appeal: &Appeal,
        approved_item: Option<&ReviewItem>,
    ) -> Result<bool, ReviewError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let closed = sqlx::query(
            r#"
            UPDATE appeals
            SET status = ?, resolved_by = ?, resolved_at = ?, resolution_note = ?
            WHERE submission_id = ? AND status = 'open'
            "#,
        )
        .bind(appeal.status.as_str())
        .bind(&appeal.resolved_by)
        .bind(appeal.resolved_at.map(to_db_time))
        .bind(&appeal.resolution_note)
        .bind(&appeal.submission_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if closed.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_error)?;
            return Ok(false);
        }

        if let Some(item) = approved_item {
            if !Self::write_item(&mut *tx, item, ModerationStatus::Rejected).await? {
                tx.rollback().await.map_err(storage_error)?;
                return Ok(false);
            }
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(true)
    }

    async fn get_appeal(&self, submission_id: &str) -> Result<Option<Appeal>, ReviewError> {
        let row = sqlx::query("SELECT * FROM appeals WHERE submission_id = ?")
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        row.as_ref().map(Self::map_appeal).transpose()
    }

    async fn list_open_appeals(&self, limit: usize) -> Result<Vec<Appeal>, ReviewError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM appeals
            WHERE status = 'open'
            ORDER BY filed_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReviewError::StorageError(e.to_string()))?;

        rows.iter().map(Self::map_appeal).collect()
    }
}
