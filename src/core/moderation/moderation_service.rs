// Moderation service - the spam-scoring pipeline.
//
// This service handles:
// - Reputation lookup (falls back to a neutral reputation on failure)
// - Content and behaviour analysis
// - Signal combination and the approve/reject/review decision
// - Recording history and writing the audit trail (best-effort)
//
// NO storage or HTTP dependencies here - collaborators come in through the
// traits below and the infra layer provides the implementations.

use super::content_analyzer::{ContentAnalyzer, ContentSignalSource};
use super::decision::DecisionEngine;
use super::moderation_config::ModerationConfig;
use super::moderation_models::{
    AuditRecord, ContentSubmission, ModerationResult, ReputationEvent, SpamSignals,
    SubmissionRecord, UserReputation,
};
use super::signals::{combine, content_hash, reputation_factors, BehaviorSignalSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("Content too large: {length} characters (max {max})")]
    ContentTooLarge { length: usize, max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// System of record for user reputations.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Look up a user's reputation. Unknown users get a fresh neutral record.
    async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError>;

    /// Fold a final moderation outcome into the user's reputation.
    async fn record_outcome(
        &self,
        user_id: &str,
        event: ReputationEvent,
        at: DateTime<Utc>,
    ) -> Result<UserReputation, ModerationError>;
}

/// Per-author submission history, used for behaviour scoring.
#[async_trait]
pub trait SubmissionHistory: Send + Sync {
    async fn record_submission(&self, record: SubmissionRecord) -> Result<(), ModerationError>;

    /// Submissions by `author_id` at or after `since`, oldest first.
    async fn recent_submissions(
        &self,
        author_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SubmissionRecord>, ModerationError>;
}

/// Append-only audit trail of every decision.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError>;
}

// Trait-object impls so the binary can pick implementations at runtime.
// The reputation store is shared with the review service, hence `Arc`.
#[async_trait]
impl ReputationStore for Arc<dyn ReputationStore> {
    async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError> {
        (**self).get_reputation(user_id).await
    }

    async fn record_outcome(
        &self,
        user_id: &str,
        event: ReputationEvent,
        at: DateTime<Utc>,
    ) -> Result<UserReputation, ModerationError> {
        (**self).record_outcome(user_id, event, at).await
    }
}

#[async_trait]
impl AuditSink for Box<dyn AuditSink> {
    async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError> {
        (**self).record(record).await
    }
}

/// Await a collaborator call, turning an elapsed deadline into an error.
async fn with_timeout<T, F>(
    what: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ModerationError>
where
    F: Future<Output = Result<T, ModerationError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ModerationError::Timeout(what, limit)),
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// The moderation pipeline.
///
/// Holds no mutable state of its own, so one instance can be shared behind an
/// `Arc` and called concurrently for unrelated submissions.
pub struct ModerationService<R, B, A, C = ContentAnalyzer>
where
    R: ReputationStore,
    B: BehaviorSignalSource,
    A: AuditSink,
    C: ContentSignalSource,
{
    reputation: R,
    behavior: B,
    audit: A,
    content: C,
    decision: DecisionEngine,
    timeout: Duration,
    system_version: String,
}

impl<R, B, A> ModerationService<R, B, A, ContentAnalyzer>
where
    R: ReputationStore,
    B: BehaviorSignalSource,
    A: AuditSink,
{
    /// Create a pipeline using the rule-based content analyzer built from `config`.
    pub fn new(config: &ModerationConfig, reputation: R, behavior: B, audit: A) -> Self {
        Self::with_content_source(
            config,
            reputation,
            behavior,
            audit,
            ContentAnalyzer::new(config),
        )
    }
}

impl<R, B, A, C> ModerationService<R, B, A, C>
where
    R: ReputationStore,
    B: BehaviorSignalSource,
    A: AuditSink,
    C: ContentSignalSource,
{
    pub fn with_content_source(
        config: &ModerationConfig,
        reputation: R,
        behavior: B,
        audit: A,
        content: C,
    ) -> Self {
        Self {
            reputation,
            behavior,
            audit,
            content,
            decision: DecisionEngine::new(config),
            timeout: config.collaborator_timeout(),
            system_version: config.system_version.clone(),
        }
    }

    /// Moderate a submission.
    ///
    /// Never fails: analysis errors route to `pending_review` with
    /// `system_error`, and audit failures are logged and dropped.
    pub async fn moderate(&self, submission: &ContentSubmission) -> ModerationResult {
        let now = Utc::now();
        let reputation = self.lookup_reputation(&submission.author_id, now).await;

        let (result, signals) = match self.analyze(submission, &reputation).await {
            Ok(signals) => {
                let result = self.decision.decide(
                    &submission.id,
                    &signals,
                    reputation.effective_trust_level(),
                    now,
                );
                (result, Some(signals))
            }
            Err(e) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    author_id = %submission.author_id,
                    error = %e,
                    "Moderation analysis failed, routing to human review"
                );
                (self.decision.system_error(&submission.id, now), None)
            }
        };

        tracing::info!(
            submission_id = %submission.id,
            author_id = %submission.author_id,
            status = %result.status,
            confidence = result.confidence,
            "Moderation decision"
        );

        self.write_audit(submission, &result, signals, now).await;
        result
    }

    /// Compute the full signal breakdown without deciding or auditing.
    ///
    /// The submission is still fed to the behaviour source's history. History
    /// writes are idempotent per submission id and a submission never scores
    /// against itself, so analysing the same input twice gives the same signals.
    pub async fn analyze(
        &self,
        submission: &ContentSubmission,
        reputation: &UserReputation,
    ) -> Result<SpamSignals, ModerationError> {
        let content = self.content.analyze(submission)?;

        let record = SubmissionRecord {
            submission_id: submission.id.clone(),
            author_id: submission.author_id.clone(),
            content_hash: content_hash(&submission.content),
            submitted_at: submission.created_at,
        };
        let behavior = with_timeout(
            "behaviour lookup",
            self.timeout,
            self.behavior.behavior_signals(&record),
        )
        .await?;

        let signals = combine(content, behavior, reputation_factors(reputation));

        if let Err(e) =
            with_timeout("history write", self.timeout, self.behavior.observe(record)).await
        {
            tracing::warn!(submission_id = %submission.id, error = %e, "Failed to record submission history");
        }

        Ok(signals)
    }

    async fn lookup_reputation(&self, user_id: &str, now: DateTime<Utc>) -> UserReputation {
        match with_timeout(
            "reputation lookup",
            self.timeout,
            self.reputation.get_reputation(user_id),
        )
        .await
        {
            Ok(reputation) => reputation,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Reputation lookup failed, using neutral reputation");
                UserReputation::neutral(user_id, now)
            }
        }
    }

    async fn write_audit(
        &self,
        submission: &ContentSubmission,
        result: &ModerationResult,
        signals: Option<SpamSignals>,
        now: DateTime<Utc>,
    ) {
        let record = AuditRecord {
            submission_id: submission.id.clone(),
            author_id: submission.author_id.clone(),
            submission_type: submission.kind,
            status: result.status,
            confidence: result.confidence,
            reasons: result.reasons.clone(),
            signals,
            recorded_at: now,
            system_version: self.system_version.clone(),
        };

        if let Err(e) = with_timeout("audit write", self.timeout, self.audit.record(&record)).await
        {
            tracing::warn!(submission_id = %submission.id, error = %e, "Failed to write audit record");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{
        reasons, BehavioralAnalysis, ContentAnalysis, HistoryBehaviorAnalyzer, ModerationStatus,
        PlaceholderBehaviorSignals, SubmissionMetadata, SubmissionType,
    };
    use crate::infra::moderation::{
        InMemoryAuditLog, InMemoryReputationStore, InMemorySubmissionHistory,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingReputation;

    #[async_trait]
    impl ReputationStore for FailingReputation {
        async fn get_reputation(&self, _user_id: &str) -> Result<UserReputation, ModerationError> {
            Err(ModerationError::StorageError("connection refused".to_string()))
        }

        async fn record_outcome(
            &self,
            _user_id: &str,
            _event: ReputationEvent,
            _at: DateTime<Utc>,
        ) -> Result<UserReputation, ModerationError> {
            Err(ModerationError::StorageError("connection refused".to_string()))
        }
    }

    struct SlowReputation;

    #[async_trait]
    impl ReputationStore for SlowReputation {
        async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let mut rep = UserReputation::neutral(user_id, Utc::now());
            rep.trust_level = 4;
            Ok(rep)
        }

        async fn record_outcome(
            &self,
            user_id: &str,
            _event: ReputationEvent,
            at: DateTime<Utc>,
        ) -> Result<UserReputation, ModerationError> {
            Ok(UserReputation::neutral(user_id, at))
        }
    }

    struct FailingAudit {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AuditSink for FailingAudit {
        async fn record(&self, _record: &AuditRecord) -> Result<(), ModerationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ModerationError::StorageError("disk full".to_string()))
        }
    }

    struct ExplodingAnalyzer;

    impl ContentSignalSource for ExplodingAnalyzer {
        fn analyze(
            &self,
            _submission: &ContentSubmission,
        ) -> Result<ContentAnalysis, ModerationError> {
            Err(ModerationError::Upstream("tokenizer crashed".to_string()))
        }
    }

    struct FailingBehavior;

    #[async_trait]
    impl BehaviorSignalSource for FailingBehavior {
        async fn behavior_signals(
            &self,
            _current: &SubmissionRecord,
        ) -> Result<BehavioralAnalysis, ModerationError> {
            Err(ModerationError::StorageError("history unavailable".to_string()))
        }
    }

    fn placeholder() -> PlaceholderBehaviorSignals {
        PlaceholderBehaviorSignals::new(Default::default())
    }

    fn submission(id: &str, author: &str, content: &str) -> ContentSubmission {
        ContentSubmission {
            id: id.to_string(),
            kind: SubmissionType::Work,
            content: content.to_string(),
            metadata: SubmissionMetadata::default(),
            author_id: author.to_string(),
            created_at: Utc::now(),
        }
    }

    fn trusted_veteran(user_id: &str) -> UserReputation {
        let mut rep = UserReputation::neutral(user_id, Utc::now());
        rep.trust_level = 4;
        rep.total_submissions = 40;
        rep.approved_submissions = 40;
        rep
    }

    const CLEAN_TEXT: &str =
        "The lighthouse keeper walked along the shore at dusk, listening to gulls.";

    #[tokio::test]
    async fn trusted_clean_submission_is_approved() {
        let reputation = InMemoryReputationStore::new();
        reputation.insert(trusted_veteran("veteran"));
        let audit = InMemoryAuditLog::new();
        let service = ModerationService::new(
            &ModerationConfig::default(),
            reputation,
            placeholder(),
            audit.clone(),
        );

        let result = service.moderate(&submission("s1", "veteran", CLEAN_TEXT)).await;

        assert_eq!(result.status, ModerationStatus::Approved);
        assert_eq!(result.reasons, vec![reasons::AUTOMATED_APPROVAL]);
        assert!(result.appeal_deadline.is_none());
        assert_eq!(audit.records().len(), 1);
    }

    #[tokio::test]
    async fn keyword_spam_from_new_user_is_rejected() {
        let service = ModerationService::new(
            &ModerationConfig::default(),
            InMemoryReputationStore::new(),
            placeholder(),
            InMemoryAuditLog::new(),
        );
        let text = "Buy now! Click here for free money, limited time only, act now and make money";

        let result = service.moderate(&submission("s2", "newbie", text)).await;

        assert_eq!(result.status, ModerationStatus::Rejected);
        assert!(result.has_reason(reasons::SPAM_KEYWORDS_DETECTED));
        assert!(result.appeal_deadline.is_some());
    }

    #[tokio::test]
    async fn shortener_burst_from_new_user_is_not_approved() {
        let service = ModerationService::new(
            &ModerationConfig::default(),
            InMemoryReputationStore::new(),
            placeholder(),
            InMemoryAuditLog::new(),
        );
        let text = "BUY NOW!!! https://bit.ly/x https://bit.ly/y https://bit.ly/z https://bit.ly/w";
        let sub = submission("s3", "newbie", text);

        let reputation = UserReputation::neutral("newbie", Utc::now());
        let signals = service.analyze(&sub, &reputation).await.unwrap();
        assert!(signals.content_analysis.link_spam_score >= 0.5);
        assert!(signals.content_analysis.keyword_spam_score >= 0.1);

        let result = service.moderate(&sub).await;
        assert!(matches!(
            result.status,
            ModerationStatus::Rejected | ModerationStatus::PendingReview
        ));
        assert!(result.has_reason(reasons::SUSPICIOUS_LINKS));
    }

    #[tokio::test]
    async fn analysis_failure_routes_to_review() {
        let audit = InMemoryAuditLog::new();
        let service = ModerationService::with_content_source(
            &ModerationConfig::default(),
            InMemoryReputationStore::new(),
            placeholder(),
            audit.clone(),
            ExplodingAnalyzer,
        );

        let result = service.moderate(&submission("s4", "anyone", CLEAN_TEXT)).await;

        assert_eq!(result.status, ModerationStatus::PendingReview);
        assert_eq!(result.reasons, vec![reasons::SYSTEM_ERROR]);
        assert!(result.appeal_deadline.is_some());

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].signals.is_none());
    }

    #[tokio::test]
    async fn behaviour_failure_routes_to_review() {
        let service = ModerationService::new(
            &ModerationConfig::default(),
            InMemoryReputationStore::new(),
            FailingBehavior,
            InMemoryAuditLog::new(),
        );

        let result = service.moderate(&submission("s5", "anyone", CLEAN_TEXT)).await;

        assert_eq!(result.status, ModerationStatus::PendingReview);
        assert_eq!(result.reasons, vec![reasons::SYSTEM_ERROR]);
    }

    #[tokio::test]
    async fn reputation_failure_falls_back_to_neutral() {
        let audit = InMemoryAuditLog::new();
        let service = ModerationService::new(
            &ModerationConfig::default(),
            FailingReputation,
            placeholder(),
            audit.clone(),
        );

        let result = service.moderate(&submission("s6", "anyone", CLEAN_TEXT)).await;

        // Neutral reputation: trust 0, standing 0.5
        let records = audit.records();
        let factors = records[0].signals.unwrap().reputation_factors;
        assert_eq!(factors.user_trust_level, 0.0);
        assert_eq!(factors.community_standing, 0.5);
        assert_ne!(result.reasons, vec![reasons::SYSTEM_ERROR]);
    }

    #[tokio::test]
    async fn slow_reputation_lookup_times_out() {
        let config = ModerationConfig {
            collaborator_timeout_ms: 20,
            ..Default::default()
        };
        let audit = InMemoryAuditLog::new();
        let service = ModerationService::new(&config, SlowReputation, placeholder(), audit.clone());

        service.moderate(&submission("s7", "anyone", CLEAN_TEXT)).await;

        let factors = audit.records()[0].signals.unwrap().reputation_factors;
        assert_eq!(factors.user_trust_level, 0.0);
    }

    #[tokio::test]
    async fn audit_failure_is_swallowed() {
        let audit = Arc::new(FailingAudit {
            attempts: AtomicUsize::new(0),
        });
        let reputation = InMemoryReputationStore::new();
        reputation.insert(trusted_veteran("veteran"));
        let service = ModerationService::new(
            &ModerationConfig::default(),
            reputation,
            placeholder(),
            SharedAudit(audit.clone()),
        );

        let result = service.moderate(&submission("s8", "veteran", CLEAN_TEXT)).await;

        assert_eq!(result.status, ModerationStatus::Approved);
        assert_eq!(audit.attempts.load(Ordering::SeqCst), 1);
    }

    struct SharedAudit(Arc<FailingAudit>);

    #[async_trait]
    impl AuditSink for SharedAudit {
        async fn record(&self, record: &AuditRecord) -> Result<(), ModerationError> {
            self.0.record(record).await
        }
    }

    #[tokio::test]
    async fn pipeline_is_deterministic() {
        let reputation = InMemoryReputationStore::new();
        reputation.insert(trusted_veteran("veteran"));
        let service = ModerationService::new(
            &ModerationConfig::default(),
            reputation,
            placeholder(),
            InMemoryAuditLog::new(),
        );
        let sub = submission("s9", "veteran", "Cheap discount!! Visit https://bit.ly/deal today");

        let mut first = service.moderate(&sub).await;
        let mut second = service.moderate(&sub).await;
        first.appeal_deadline = None;
        second.appeal_deadline = None;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn audit_record_carries_full_breakdown() {
        let audit = InMemoryAuditLog::new();
        let config = ModerationConfig::default();
        let service = ModerationService::new(
            &config,
            InMemoryReputationStore::new(),
            placeholder(),
            audit.clone(),
        );

        let result = service.moderate(&submission("s10", "author-7", CLEAN_TEXT)).await;

        let records = audit.records();
        let record = &records[0];
        assert_eq!(record.submission_id, "s10");
        assert_eq!(record.author_id, "author-7");
        assert_eq!(record.status, result.status);
        assert_eq!(record.reasons, result.reasons);
        assert_eq!(record.system_version, config.system_version);
        let signals = record.signals.unwrap();
        assert!((0.0..=1.0).contains(&signals.overall_spam_probability));
    }

    #[tokio::test]
    async fn history_backed_pipeline_records_submissions() {
        let history = InMemorySubmissionHistory::new();
        let config = ModerationConfig::default();
        let service = ModerationService::new(
            &config,
            InMemoryReputationStore::new(),
            HistoryBehaviorAnalyzer::new(history.clone(), &config),
            InMemoryAuditLog::new(),
        );

        for i in 0..3 {
            service
                .moderate(&submission(&format!("h{}", i), "poster", "same text again"))
                .await;
        }

        let since = Utc::now() - chrono::Duration::hours(1);
        let recorded = history.recent_submissions("poster", since).await.unwrap();
        assert_eq!(recorded.len(), 3);
    }

    #[tokio::test]
    async fn history_mode_rescoring_is_stable() {
        let history = InMemorySubmissionHistory::new();
        let config = ModerationConfig::default();
        let service = ModerationService::new(
            &config,
            InMemoryReputationStore::new(),
            HistoryBehaviorAnalyzer::new(history.clone(), &config),
            InMemoryAuditLog::new(),
        );
        let veteran = trusted_veteran("poster");
        let sub = submission("same", "poster", CLEAN_TEXT);

        let mut runs = Vec::new();
        for _ in 0..5 {
            runs.push(service.analyze(&sub, &veteran).await.unwrap());
        }

        assert!(runs.iter().all(|s| *s == runs[0]), "{:?}", runs);
        let since = sub.created_at - chrono::Duration::hours(1);
        let recorded = history.recent_submissions("poster", since).await.unwrap();
        assert_eq!(recorded.len(), 1);
    }

    #[tokio::test]
    async fn history_mode_moderation_is_deterministic() {
        let history = InMemorySubmissionHistory::new();
        let config = ModerationConfig::default();
        let reputation = InMemoryReputationStore::new();
        reputation.insert(trusted_veteran("poster"));
        let service = ModerationService::new(
            &config,
            reputation,
            HistoryBehaviorAnalyzer::new(history.clone(), &config),
            InMemoryAuditLog::new(),
        );
        let earlier = submission("first", "poster", "same text again");
        let mut later = submission("second", "poster", "same text again");
        later.created_at = earlier.created_at + chrono::Duration::minutes(1);

        let mut first = service.moderate(&earlier).await;
        service.moderate(&later).await;
        // A later submission must not change how an earlier one scores
        let mut again = service.moderate(&earlier).await;
        first.appeal_deadline = None;
        again.appeal_deadline = None;

        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn scores_stay_in_unit_range_for_assorted_inputs() {
        let service = ModerationService::new(
            &ModerationConfig::default(),
            InMemoryReputationStore::new(),
            placeholder(),
            InMemoryAuditLog::new(),
        );
        let reputation = UserReputation::neutral("x", Utc::now());
        let inputs = [
            "",
            "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!",
            "AAAAAAAAAAA BBBBBBBBBB CCCCCCCCCC $1 $2 $3 $4 $5 $6 $7 $8 $9",
            "word word word word word word word word word word",
            "hate hate hate hate hate hate hate hate hate hate hate hate",
        ];

        for (i, text) in inputs.iter().enumerate() {
            let sub = submission(&format!("r{}", i), "x", text);
            let s = service.analyze(&sub, &reputation).await.unwrap();
            let c = s.content_analysis;
            for score in [
                c.keyword_spam_score,
                c.repetition_score,
                c.link_spam_score,
                c.sentiment_score,
                s.overall_spam_probability,
            ] {
                assert!((0.0..=1.0).contains(&score), "{} out of range for {:?}", score, text);
            }
        }
    }
}
