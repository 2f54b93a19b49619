// SQLite-backed reputation store.
//
// Tables:
// - user_reputation: one row per user, updated as outcomes come in

use crate::core::moderation::{ModerationError, ReputationEvent, ReputationStore, UserReputation};
use crate::infra::db::{from_db_time, to_db_time};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

#[derive(Clone)]
pub struct SqliteReputationStore {
    pool: Pool<Sqlite>,
}

impl SqliteReputationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_reputation (
                user_id TEXT PRIMARY KEY,
                trust_level INTEGER NOT NULL DEFAULT 0,
                reputation_score INTEGER NOT NULL DEFAULT 0,
                strikes INTEGER NOT NULL DEFAULT 0,
                last_violation TEXT,
                total_submissions INTEGER NOT NULL DEFAULT 0,
                approved_submissions INTEGER NOT NULL DEFAULT 0,
                community_reports INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a reputation row (seeding, admin edits).
    pub async fn upsert(&self, reputation: &UserReputation) -> Result<(), ModerationError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Self::write(&mut *conn, reputation).await
    }

    async fn write(
        conn: &mut sqlx::SqliteConnection,
        reputation: &UserReputation,
    ) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO user_reputation (
                user_id, trust_level, reputation_score, strikes, last_violation,
                total_submissions, approved_submissions, community_reports,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                trust_level = excluded.trust_level,
                reputation_score = excluded.reputation_score,
                strikes = excluded.strikes,
                last_violation = excluded.last_violation,
                total_submissions = excluded.total_submissions,
                approved_submissions = excluded.approved_submissions,
                community_reports = excluded.community_reports,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&reputation.user_id)
        .bind(reputation.trust_level as i64)
        .bind(reputation.reputation_score)
        .bind(reputation.strikes as i64)
        .bind(reputation.last_violation.map(to_db_time))
        .bind(reputation.total_submissions as i64)
        .bind(reputation.approved_submissions as i64)
        .bind(reputation.community_reports as i64)
        .bind(to_db_time(reputation.created_at))
        .bind(to_db_time(reputation.updated_at))
        .execute(conn)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn map_row(row: &SqliteRow) -> Result<UserReputation, ModerationError> {
        let stored_time = |column: &str| {
            from_db_time(&row.get::<String, _>(column)).map_err(|e| {
                ModerationError::StorageError(format!("bad {} timestamp: {}", column, e))
            })
        };
        let last_violation = row
            .get::<Option<String>, _>("last_violation")
            .as_deref()
            .map(from_db_time)
            .transpose()
            .map_err(|e| {
                ModerationError::StorageError(format!("bad last_violation timestamp: {}", e))
            })?;

        Ok(UserReputation {
            user_id: row.get("user_id"),
            trust_level: row.get::<i64, _>("trust_level").clamp(0, u8::MAX as i64) as u8,
            reputation_score: row.get("reputation_score"),
            strikes: row.get::<i64, _>("strikes") as u32,
            last_violation,
            total_submissions: row.get::<i64, _>("total_submissions") as u32,
            approved_submissions: row.get::<i64, _>("approved_submissions") as u32,
            community_reports: row.get::<i64, _>("community_reports") as u32,
            created_at: stored_time("created_at")?,
            updated_at: stored_time("updated_at")?,
        })
    }
}

#[async_trait]
impl ReputationStore for SqliteReputationStore {
    async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError> {
        let row = sqlx::query("SELECT * FROM user_reputation WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        match row {
            Some(row) => Self::map_row(&row),
            None => Ok(UserReputation::neutral(user_id, Utc::now())),
        }
    }

    async fn record_outcome(
        &self,
        user_id: &str,
        event: ReputationEvent,
        at: DateTime<Utc>,
    ) -> Result<UserReputation, ModerationError> {
        // Read-modify-write inside one transaction
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM user_reputation WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        let mut reputation = match row {
            Some(row) => Self::map_row(&row)?,
            None => UserReputation::neutral(user_id, at),
        };
        reputation.apply(event, at);

        Self::write(&mut *tx, &reputation).await?;

        tx.commit()
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(reputation)
    }
}
