// In-memory implementations of the moderation ports.
//
// Handy for tests and for running the binary without a database. Each store
// wraps its map in an `Arc` so clones share state: hand one clone to a
// service and keep another to inspect what it wrote.

use crate::core::moderation::{
    AuditRecord, AuditSink, ModerationError, ReputationEvent, ReputationStore, SubmissionHistory,
    SubmissionRecord, UserReputation,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Reputations keyed by user id. Unknown users read as neutral.
#[derive(Clone, Default)]
pub struct InMemoryReputationStore {
    data: Arc<DashMap<String, UserReputation>>,
}

impl InMemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a reputation.
    pub fn insert(&self, reputation: UserReputation) {
        self.data.insert(reputation.user_id.clone(), reputation);
    }
}

#[async_trait]
impl ReputationStore for InMemoryReputationStore {
    async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError> {
        Ok(self
            .data
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| UserReputation::neutral(user_id, Utc::now())))
    }

    async fn record_outcome(
        &self,
        user_id: &str,
        event: ReputationEvent,
        at: DateTime<Utc>,
    ) -> Result<UserReputation, ModerationError> {
        // entry() holds the shard lock, so concurrent outcomes don't lose updates
        let mut entry = self
            .data
            .entry(user_id.to_string())
            .or_insert_with(|| UserReputation::neutral(user_id, at));
        entry.apply(event, at);
        Ok(entry.clone())
    }
}

/// Submission history keyed by author.
#[derive(Clone, Default)]
pub struct InMemorySubmissionHistory {
    data: Arc<DashMap<String, Vec<SubmissionRecord>>>,
}

impl InMemorySubmissionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop history older than the cutoff, returning how many records went.
    pub fn cleanup_history(&self, older_than: DateTime<Utc>) -> u64 {
        let mut removed = 0;
        for mut entry in self.data.iter_mut() {
            let before = entry.len();
            entry.retain(|r| r.submitted_at >= older_than);
            removed += (before - entry.len()) as u64;
        }
        self.data.retain(|_, records| !records.is_empty());
        removed
    }
}

#[async_trait]
impl SubmissionHistory for InMemorySubmissionHistory {
    async fn record_submission(&self, record: SubmissionRecord) -> Result<(), ModerationError> {
        let mut records = self.data.entry(record.author_id.clone()).or_default();
        // Re-moderating a submission must not add it twice
        if !records
            .iter()
            .any(|r| r.submission_id == record.submission_id)
        {
            records.push(record);
        }
        Ok(())
    }

    async fn recent_submissions(
        &self,
        author_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SubmissionRecord>, ModerationError> {
        let mut records: Vec<SubmissionRecord> = self
            .data
            .get(author_id)
            .map(|r| r.iter().filter(|s| s.submitted_at >= since).cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.submitted_at);
        Ok(records)
    }
}

/// Append-only audit trail kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}
