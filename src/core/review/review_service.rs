// Review service - staff queue, manual decisions and appeals.
//
// This service handles:
// - Queueing pipeline results and listing them by status
// - Staff approve / reject / flag on items awaiting review
// - Author appeals against rejections, within the appeal window
// - Reporting final outcomes back to the reputation store
//
// Reputation updates are best-effort: a failed update is logged and the
// review itself still goes through.

use super::review_models::{Appeal, AppealOutcome, AppealStatus, ReviewAction, ReviewItem};
use crate::core::moderation::{
    ModerationConfig, ModerationResult, ModerationStatus, ReputationEvent, ReputationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

const MAX_STATEMENT_CHARS: usize = 2_000;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} a submission that is {from}")]
    InvalidTransition {
        from: ModerationStatus,
        action: String,
    },

    #[error("Not appealable: {0}")]
    NotAppealable(String),

    #[error("Appeal window closed at {0}")]
    AppealWindowClosed(DateTime<Utc>),

    #[error("An appeal already exists for submission {0}")]
    DuplicateAppeal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Writes are conditional so concurrent reviewers cannot both win: each
/// returns `false` (and writes nothing) when the stored state has moved on.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Queue a new item. `false` if the submission is already queued.
    async fn insert_item(&self, item: &ReviewItem) -> Result<bool, ReviewError>;

    /// Replace an item only while its stored status is still `expected`.
    async fn update_item(
        &self,
        item: &ReviewItem,
        expected: ModerationStatus,
    ) -> Result<bool, ReviewError>;

    async fn get_item(&self, submission_id: &str) -> Result<Option<ReviewItem>, ReviewError>;

    /// Items currently in `status`, newest first.
    async fn list_by_status(
        &self,
        status: ModerationStatus,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, ReviewError>;

    /// Store a new appeal. An existing one for the submission is `DuplicateAppeal`.
    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), ReviewError>;

    /// Close an open appeal. With `approved_item`, also replace the item,
    /// which must still be rejected; both writes land or neither does.
    async fn close_appeal(
        &self,
        appeal: &Appeal,
        approved_item: Option<&ReviewItem>,
    ) -> Result<bool, ReviewError>;

    async fn get_appeal(&self, submission_id: &str) -> Result<Option<Appeal>, ReviewError>;

    /// Open appeals, oldest first.
    async fn list_open_appeals(&self, limit: usize) -> Result<Vec<Appeal>, ReviewError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ReviewService<S: ReviewStore, R: ReputationStore> {
    store: S,
    reputation: R,
    appeal_window: chrono::Duration,
}

impl<S: ReviewStore, R: ReputationStore> ReviewService<S, R> {
    pub fn new(config: &ModerationConfig, store: S, reputation: R) -> Self {
        Self {
            store,
            reputation,
            appeal_window: config.appeal_window(),
        }
    }

    /// Put a pipeline result in the queue.
    ///
    /// Automated approvals and rejections are final, so they are reported to
    /// the reputation store straight away. A submission that is already
    /// queued is returned as stored, untouched and not reported again.
    pub async fn enqueue(
        &self,
        author_id: &str,
        result: ModerationResult,
    ) -> Result<ReviewItem, ReviewError> {
        let now = Utc::now();
        let item = ReviewItem {
            author_id: author_id.to_string(),
            queued_at: now,
            result,
        };
        if !self.store.insert_item(&item).await? {
            tracing::debug!(
                submission_id = %item.result.submission_id,
                "Submission already queued"
            );
            return self.get(&item.result.submission_id).await;
        }

        match item.result.status {
            ModerationStatus::Approved => {
                self.report(author_id, ReputationEvent::Approved, now).await
            }
            ModerationStatus::Rejected => {
                self.report(author_id, ReputationEvent::Rejected, now).await
            }
            ModerationStatus::PendingReview | ModerationStatus::Flagged => {}
        }

        Ok(item)
    }

    pub async fn get(&self, submission_id: &str) -> Result<ReviewItem, ReviewError> {
        self.store
            .get_item(submission_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("submission {}", submission_id)))
    }

    /// List queue entries in a given status, newest first.
    pub async fn queue(
        &self,
        status: ModerationStatus,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, ReviewError> {
        self.store.list_by_status(status, limit).await
    }

    /// Apply a staff decision to an item awaiting review.
    ///
    /// Only `pending_review` and `flagged` items can be reviewed, and only
    /// `pending_review` items can be flagged.
    pub async fn review(
        &self,
        submission_id: &str,
        reviewer_id: &str,
        action: ReviewAction,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ModerationResult, ReviewError> {
        let mut item = self.get(submission_id).await?;
        let from = item.result.status;

        let allowed = match action {
            ReviewAction::Approve | ReviewAction::Reject => matches!(
                from,
                ModerationStatus::PendingReview | ModerationStatus::Flagged
            ),
            ReviewAction::Flag => from == ModerationStatus::PendingReview,
        };
        if !allowed {
            return Err(ReviewError::InvalidTransition {
                from,
                action: action.to_string(),
            });
        }

        let result = &mut item.result;
        match action {
            ReviewAction::Approve => {
                result.status = ModerationStatus::Approved;
                result.appeal_deadline = None;
            }
            ReviewAction::Reject => {
                result.status = ModerationStatus::Rejected;
                result.appeal_deadline = Some(now + self.appeal_window);
            }
            ReviewAction::Flag => {
                result.status = ModerationStatus::Flagged;
            }
        }
        result.reviewer_id = Some(reviewer_id.to_string());
        result.reviewed_at = Some(now);
        result.reviewer_notes = note;

        if !self.store.update_item(&item, from).await? {
            // Another reviewer got there first
            let current = self.get(submission_id).await?;
            return Err(ReviewError::InvalidTransition {
                from: current.result.status,
                action: action.to_string(),
            });
        }

        tracing::info!(
            submission_id,
            reviewer_id,
            action = %action,
            status = %item.result.status,
            "Staff review applied"
        );

        match action {
            ReviewAction::Approve => {
                self.report(&item.author_id, ReputationEvent::Approved, now)
                    .await
            }
            ReviewAction::Reject => {
                self.report(&item.author_id, ReputationEvent::Rejected, now)
                    .await
            }
            ReviewAction::Flag => {}
        }

        Ok(item.result)
    }

    /// File an appeal against a rejection.
    pub async fn file_appeal(
        &self,
        submission_id: &str,
        appellant_id: &str,
        statement: &str,
        now: DateTime<Utc>,
    ) -> Result<Appeal, ReviewError> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Err(ReviewError::InvalidInput(
                "appeal statement is required".to_string(),
            ));
        }
        if statement.chars().count() > MAX_STATEMENT_CHARS {
            return Err(ReviewError::InvalidInput(
                "appeal statement too long".to_string(),
            ));
        }

        let item = self.get(submission_id).await?;
        if item.author_id != appellant_id {
            return Err(ReviewError::NotAppealable(
                "only the author can appeal".to_string(),
            ));
        }
        if item.result.status != ModerationStatus::Rejected {
            return Err(ReviewError::NotAppealable(format!(
                "submission is {}",
                item.result.status
            )));
        }
        match item.result.appeal_deadline {
            Some(deadline) if now > deadline => {
                return Err(ReviewError::AppealWindowClosed(deadline));
            }
            Some(_) => {}
            None => {
                return Err(ReviewError::NotAppealable(
                    "no appeal deadline was set".to_string(),
                ));
            }
        }
        let appeal = Appeal {
            submission_id: submission_id.to_string(),
            appellant_id: appellant_id.to_string(),
            statement: statement.to_string(),
            filed_at: now,
            status: AppealStatus::Open,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        };
        self.store.insert_appeal(&appeal).await?;

        tracing::info!(submission_id, appellant_id, "Appeal filed");
        Ok(appeal)
    }

    /// Close an open appeal. Overturning approves the submission.
    pub async fn resolve_appeal(
        &self,
        submission_id: &str,
        reviewer_id: &str,
        outcome: AppealOutcome,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appeal, ReviewError> {
        let mut appeal = self
            .store
            .get_appeal(submission_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("appeal for {}", submission_id)))?;

        if appeal.status != AppealStatus::Open {
            return Err(ReviewError::InvalidInput(format!(
                "appeal is already {}",
                appeal.status.as_str()
            )));
        }

        appeal.status = match outcome {
            AppealOutcome::Upheld => AppealStatus::Upheld,
            AppealOutcome::Overturned => AppealStatus::Overturned,
        };
        appeal.resolved_by = Some(reviewer_id.to_string());
        appeal.resolved_at = Some(now);
        appeal.resolution_note = note.clone();

        let approved_item = match outcome {
            AppealOutcome::Overturned => {
                let mut item = self.get(submission_id).await?;
                item.result.status = ModerationStatus::Approved;
                item.result.appeal_deadline = None;
                item.result.reviewer_id = Some(reviewer_id.to_string());
                item.result.reviewed_at = Some(now);
                item.result.reviewer_notes = note;
                Some(item)
            }
            AppealOutcome::Upheld => None,
        };

        if !self
            .store
            .close_appeal(&appeal, approved_item.as_ref())
            .await?
        {
            return Err(self.close_conflict(submission_id).await);
        }

        if let Some(item) = &approved_item {
            self.report(&item.author_id, ReputationEvent::Overturned, now)
                .await;
        }

        tracing::info!(
            submission_id,
            reviewer_id,
            outcome = appeal.status.as_str(),
            "Appeal resolved"
        );
        Ok(appeal)
    }

    pub async fn open_appeals(&self, limit: usize) -> Result<Vec<Appeal>, ReviewError> {
        self.store.list_open_appeals(limit).await
    }

    /// Explain why a close was refused after someone else changed the state.
    async fn close_conflict(&self, submission_id: &str) -> ReviewError {
        let appeal = match self.store.get_appeal(submission_id).await {
            Ok(Some(appeal)) => appeal,
            Ok(None) => return ReviewError::NotFound(format!("appeal for {}", submission_id)),
            Err(e) => return e,
        };
        if appeal.status != AppealStatus::Open {
            return ReviewError::InvalidInput(format!(
                "appeal is already {}",
                appeal.status.as_str()
            ));
        }
        match self.get(submission_id).await {
            Ok(item) => ReviewError::InvalidTransition {
                from: item.result.status,
                action: "overturn".to_string(),
            },
            Err(e) => e,
        }
    }

    async fn report(&self, user_id: &str, event: ReputationEvent, at: DateTime<Utc>) {
        if let Err(e) = self.reputation.record_outcome(user_id, event, at).await {
            tracing::warn!(
                user_id,
                event = event.as_str(),
                error = %e,
                "Failed to update reputation"
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
