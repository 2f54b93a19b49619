// Moderation domain models - data structures for the spam-scoring pipeline.
//
// These are pure domain types with no storage or transport dependencies.
// Everything here is (de)serializable so the binary can read submissions as
// JSON and infra stores can persist results and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason codes attached to a `ModerationResult`.
///
/// These are for staff-facing review tooling, never shown to the author.
pub mod reasons {
    pub const AUTOMATED_APPROVAL: &str = "automated_approval";
    pub const AUTOMATED_SPAM_DETECTION: &str = "automated_spam_detection";
    pub const ROUTINE_QUALITY_CHECK: &str = "routine_quality_check";
    pub const SYSTEM_ERROR: &str = "system_error";

    // Rejection band
    pub const SPAM_KEYWORDS_DETECTED: &str = "spam_keywords_detected";
    pub const REPETITIVE_CONTENT: &str = "repetitive_content";
    pub const SUSPICIOUS_LINKS: &str = "suspicious_links";
    pub const INAPPROPRIATE_SENTIMENT: &str = "inappropriate_sentiment";
    pub const SUSPICIOUS_BEHAVIOR: &str = "suspicious_behavior";
    pub const VIOLATION_HISTORY: &str = "violation_history";

    // Review band
    pub const POSSIBLE_SPAM_KEYWORDS: &str = "possible_spam_keywords";
    pub const SOME_REPETITION: &str = "some_repetition";
    pub const MULTIPLE_LINKS: &str = "multiple_links";
    pub const SENTIMENT_CONCERNS: &str = "sentiment_concerns";
    pub const UNUSUAL_ACTIVITY: &str = "unusual_activity";
    pub const NEW_USER_CONTENT: &str = "new_user_content";
}

/// Kind of content being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Work,
    Comment,
    Profile,
    Collection,
}

impl std::fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionType::Work => write!(f, "work"),
            SubmissionType::Comment => write!(f, "comment"),
            SubmissionType::Profile => write!(f, "profile"),
            SubmissionType::Collection => write!(f, "collection"),
        }
    }
}

/// Optional metadata that travels with a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A piece of user content awaiting moderation. Immutable input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSubmission {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SubmissionType,
    pub content: String,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

/// Highest trust level a user can hold.
pub const MAX_TRUST_LEVEL: u8 = 4;

/// A user's standing, owned by the account store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: String,
    /// 0..=4, higher is more trusted
    pub trust_level: u8,
    pub reputation_score: i64,
    pub strikes: u32,
    #[serde(default)]
    pub last_violation: Option<DateTime<Utc>>,
    pub total_submissions: u32,
    pub approved_submissions: u32,
    pub community_reports: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserReputation {
    /// Reputation for a user we know nothing about: trust 0, no history.
    ///
    /// Also used as the fallback when the reputation lookup fails.
    pub fn neutral(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            trust_level: 0,
            reputation_score: 0,
            strikes: 0,
            last_violation: None,
            total_submissions: 0,
            approved_submissions: 0,
            community_reports: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Trust level clamped to the valid 0..=4 range.
    pub fn effective_trust_level(&self) -> u8 {
        self.trust_level.min(MAX_TRUST_LEVEL)
    }
}

/// A final outcome that moves a user's reputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationEvent {
    Approved,
    Rejected,
    /// A rejection reversed on appeal
    Overturned,
}

impl ReputationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationEvent::Approved => "approved",
            ReputationEvent::Rejected => "rejected",
            ReputationEvent::Overturned => "overturned",
        }
    }
}

const APPROVAL_POINTS: i64 = 1;
const STRIKE_POINTS: i64 = 5;

/// Trust earned from approved submissions before strikes are subtracted.
fn earned_trust(approved: u32) -> u8 {
    match approved {
        0..=4 => 0,
        5..=19 => 1,
        20..=49 => 2,
        50..=99 => 3,
        _ => MAX_TRUST_LEVEL,
    }
}

impl UserReputation {
    /// Apply an outcome and recompute the trust level.
    ///
    /// Trust comes from approved submissions, minus one level per strike.
    pub fn apply(&mut self, event: ReputationEvent, at: DateTime<Utc>) {
        match event {
            ReputationEvent::Approved => {
                self.total_submissions = self.total_submissions.saturating_add(1);
                self.approved_submissions = self.approved_submissions.saturating_add(1);
                self.reputation_score += APPROVAL_POINTS;
            }
            ReputationEvent::Rejected => {
                self.total_submissions = self.total_submissions.saturating_add(1);
                self.strikes = self.strikes.saturating_add(1);
                self.last_violation = Some(at);
                self.reputation_score -= STRIKE_POINTS;
            }
            ReputationEvent::Overturned => {
                self.approved_submissions = self.approved_submissions.saturating_add(1);
                self.strikes = self.strikes.saturating_sub(1);
                self.reputation_score += STRIKE_POINTS + APPROVAL_POINTS;
            }
        }

        let penalty = self.strikes.min(MAX_TRUST_LEVEL as u32) as u8;
        self.trust_level = earned_trust(self.approved_submissions).saturating_sub(penalty);
        self.updated_at = at;
    }
}

/// Signals extracted from the submitted text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub keyword_spam_score: f64,
    pub repetition_score: f64,
    pub link_spam_score: f64,
    pub sentiment_score: f64,
}

/// Signals extracted from the author's submission cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralAnalysis {
    pub velocity_score: f64,
    pub pattern_score: f64,
    pub timing_score: f64,
}

/// Normalized view of a `UserReputation`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationFactors {
    pub user_trust_level: f64,
    pub historical_violations: f64,
    pub community_standing: f64,
}

/// Full signal breakdown for one submission. Every score is in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamSignals {
    pub content_analysis: ContentAnalysis,
    pub behavioral_analysis: BehavioralAnalysis,
    pub reputation_factors: ReputationFactors,
    pub overall_spam_probability: f64,
}

/// Outcome of moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Approved,
    Rejected,
    PendingReview,
    /// Only set by staff escalation, never by the automated pipeline
    Flagged,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::PendingReview => "pending_review",
            ModerationStatus::Flagged => "flagged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(ModerationStatus::Approved),
            "rejected" => Some(ModerationStatus::Rejected),
            "pending_review" => Some(ModerationStatus::PendingReview),
            "flagged" => Some(ModerationStatus::Flagged),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal artifact of the pipeline, later updated by staff review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub submission_id: String,
    pub status: ModerationStatus,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub reviewer_id: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appeal_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

impl ModerationResult {
    /// Result used whenever signal computation fails.
    pub fn system_error(submission_id: &str, appeal_deadline: DateTime<Utc>) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            status: ModerationStatus::PendingReview,
            confidence: 0.0,
            reasons: vec![reasons::SYSTEM_ERROR.to_string()],
            reviewer_id: None,
            reviewed_at: None,
            appeal_deadline: Some(appeal_deadline),
            reviewer_notes: None,
        }
    }

    pub fn has_reason(&self, code: &str) -> bool {
        self.reasons.iter().any(|r| r == code)
    }
}

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub submission_id: String,
    pub author_id: String,
    pub submission_type: SubmissionType,
    pub status: ModerationStatus,
    pub confidence: f64,
    pub reasons: Vec<String>,
    /// Absent when analysis failed
    pub signals: Option<SpamSignals>,
    pub recorded_at: DateTime<Utc>,
    pub system_version: String,
}

/// Minimal trace of a past submission, used for behaviour scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub author_id: String,
    pub content_hash: u64,
    pub submitted_at: DateTime<Utc>,
}
