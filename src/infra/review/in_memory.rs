use crate::core::moderation::ModerationStatus;
use crate::core::review::{Appeal, AppealStatus, ReviewError, ReviewItem, ReviewStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Queue entries and appeals keyed by submission id.
#[derive(Clone, Default)]
pub struct InMemoryReviewStore {
    items: Arc<DashMap<String, ReviewItem>>,
    appeals: Arc<DashMap<String, Appeal>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn insert_item(&self, item: &ReviewItem) -> Result<bool, ReviewError> {
        match self.items.entry(item.result.submission_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(item.clone());
                Ok(true)
            }
        }
    }

    async fn update_item(
        &self,
        item: &ReviewItem,
        expected: ModerationStatus,
    ) -> Result<bool, ReviewError> {
        match self.items.get_mut(&item.result.submission_id) {
            Some(mut stored) if stored.result.status == expected => {
                *stored = item.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_item(&self, submission_id: &str) -> Result<Option<ReviewItem>, ReviewError> {
        Ok(self.items.get(submission_id).map(|entry| entry.clone()))
    }

    async fn list_by_status(
        &self,
        status: ModerationStatus,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, ReviewError> {
        let mut items: Vec<ReviewItem> = self
            .items
            .iter()
            .filter(|entry| entry.result.status == status)
            .map(|entry| entry.value().clone())
            .collect();

        items.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), ReviewError> {
        match self.appeals.entry(appeal.submission_id.clone()) {
            Entry::Occupied(_) => Err(ReviewError::DuplicateAppeal(
                appeal.submission_id.clone(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(appeal.clone());
                Ok(())
            }
        }
    }

    async fn close_appeal(
        &self,
        appeal: &Appeal,
        approved_item: Option<&ReviewItem>,
    ) -> Result<bool, ReviewError> {
        // Lock order: appeal, then item
        let mut stored_appeal = match self.appeals.get_mut(&appeal.submission_id) {
            Some(stored) if stored.status == AppealStatus::Open => stored,
            _ => return Ok(false),
        };

        if let Some(item) = approved_item {
            match self.items.get_mut(&item.result.submission_id) {
                Some(mut stored) if stored.result.status == ModerationStatus::Rejected => {
                    *stored = item.clone();
                }
                _ => return Ok(false),
            }
        }

        *stored_appeal = appeal.clone();
        Ok(true)
    }

    async fn get_appeal(&self, submission_id: &str) -> Result<Option<Appeal>, ReviewError> {
        Ok(self.appeals.get(submission_id).map(|entry| entry.clone()))
    }

    async fn list_open_appeals(&self, limit: usize) -> Result<Vec<Appeal>, ReviewError> {
        let mut appeals: Vec<Appeal> = self
            .appeals
            .iter()
            .filter(|entry| entry.status == AppealStatus::Open)
            .map(|entry| entry.value().clone())
            .collect();

        appeals.sort_by(|a, b| a.filed_at.cmp(&b.filed_at));
        appeals.truncate(limit);
        Ok(appeals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ModerationResult;
    use chrono::{Duration, Utc};

    fn item(id: &str, status: ModerationStatus, minutes_ago: i64) -> ReviewItem {
        ReviewItem {
            author_id: "author-1".to_string(),
            queued_at: Utc::now() - Duration::minutes(minutes_ago),
            result: ModerationResult {
                submission_id: id.to_string(),
                status,
                confidence: 0.5,
                reasons: vec![],
                reviewer_id: None,
                reviewed_at: None,
                appeal_deadline: None,
                reviewer_notes: None,
            },
        }
    }

    fn appeal(id: &str) -> Appeal {
        Appeal {
            submission_id: id.to_string(),
            appellant_id: "author-1".to_string(),
            statement: "please look again".to_string(),
            filed_at: Utc::now(),
            status: AppealStatus::Open,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        }
    }

    fn resolved(mut appeal: Appeal, status: AppealStatus) -> Appeal {
        appeal.status = status;
        appeal.resolved_by = Some("staff-1".to_string());
        appeal.resolved_at = Some(Utc::now());
        appeal
    }

    #[tokio::test]
    async fn lists_by_status_newest_first() {
        let store = InMemoryReviewStore::new();
        for (id, status, minutes_ago) in [
            ("old", ModerationStatus::PendingReview, 30),
            ("new", ModerationStatus::PendingReview, 1),
            ("done", ModerationStatus::Approved, 5),
        ] {
            assert!(store
                .insert_item(&item(id, status, minutes_ago))
                .await
                .unwrap());
        }

        let pending = store
            .list_by_status(ModerationStatus::PendingReview, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = pending
            .iter()
            .map(|i| i.result.submission_id.as_str())
            .collect();
        assert_eq!(ids, vec!["new", "old"]);

        let limited = store
            .list_by_status(ModerationStatus::PendingReview, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn insert_keeps_the_first_entry() {
        let store = InMemoryReviewStore::new();
        assert!(store
            .insert_item(&item("s1", ModerationStatus::PendingReview, 1))
            .await
            .unwrap());
        assert!(!store
            .insert_item(&item("s1", ModerationStatus::Rejected, 0))
            .await
            .unwrap());

        let stored = store.get_item("s1").await.unwrap().unwrap();
        assert_eq!(stored.result.status, ModerationStatus::PendingReview);
        assert!(store.get_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_requires_expected_status() {
        let store = InMemoryReviewStore::new();
        store
            .insert_item(&item("s1", ModerationStatus::PendingReview, 1))
            .await
            .unwrap();

        let approved = item("s1", ModerationStatus::Approved, 1);
        assert!(store
            .update_item(&approved, ModerationStatus::PendingReview)
            .await
            .unwrap());

        let rejected = item("s1", ModerationStatus::Rejected, 1);
        assert!(!store
            .update_item(&rejected, ModerationStatus::PendingReview)
            .await
            .unwrap());
        let ghost = item("ghost", ModerationStatus::Approved, 0);
        assert!(!store
            .update_item(&ghost, ModerationStatus::PendingReview)
            .await
            .unwrap());

        let stored = store.get_item("s1").await.unwrap().unwrap();
        assert_eq!(stored.result.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn second_appeal_insert_is_a_duplicate() {
        let store = InMemoryReviewStore::new();
        store.insert_appeal(&appeal("s1")).await.unwrap();

        let err = store.insert_appeal(&appeal("s1")).await.unwrap_err();
        assert!(matches!(err, ReviewError::DuplicateAppeal(_)));
    }

    #[tokio::test]
    async fn close_appeal_applies_once() {
        let store = InMemoryReviewStore::new();
        store
            .insert_item(&item("s1", ModerationStatus::Rejected, 1))
            .await
            .unwrap();
        store.insert_appeal(&appeal("s1")).await.unwrap();
        let approved = item("s1", ModerationStatus::Approved, 1);

        let first = resolved(appeal("s1"), AppealStatus::Overturned);
        assert!(store.close_appeal(&first, Some(&approved)).await.unwrap());

        let second = resolved(appeal("s1"), AppealStatus::Upheld);
        assert!(!store.close_appeal(&second, None).await.unwrap());

        let stored = store.get_appeal("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, AppealStatus::Overturned);
        let item = store.get_item("s1").await.unwrap().unwrap();
        assert_eq!(item.result.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn overturn_needs_a_rejected_item() {
        let store = InMemoryReviewStore::new();
        store
            .insert_item(&item("s1", ModerationStatus::Approved, 1))
            .await
            .unwrap();
        store.insert_appeal(&appeal("s1")).await.unwrap();

        let overturned = resolved(appeal("s1"), AppealStatus::Overturned);
        let approved = item("s1", ModerationStatus::Approved, 0);
        assert!(!store
            .close_appeal(&overturned, Some(&approved))
            .await
            .unwrap());

        // Nothing was written
        let stored = store.get_appeal("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, AppealStatus::Open);
    }
}
