// Decision engine - maps a spam probability to an outcome.
//
// Evaluation order matters: rejection is checked before approval, and
// whatever is left lands in the review band.
//
// Trust shifts both thresholds by `trust_level * trust_step`: the reject
// threshold moves up and the approve threshold moves down. With the default
// tuning the two bands meet (or cross) for every trust level, so the
// automated pipeline only produces `pending_review` under custom thresholds
// or on system errors.

use super::moderation_config::ModerationConfig;
use super::moderation_models::{reasons, ModerationResult, ModerationStatus, SpamSignals};
use super::signals::{behavior_score, clamp_unit};
use chrono::{DateTime, Utc};

/// Thresholds after applying a user's trust bonus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustedThresholds {
    /// Reject when spam >= this
    pub reject_at: f64,
    /// Approve when spam <= this
    pub approve_at: f64,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    auto_approve: f64,
    auto_reject: f64,
    trust_step: f64,
    reject_reason_threshold: f64,
    review_reason_threshold: f64,
    appeal_window: chrono::Duration,
}

impl DecisionEngine {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            auto_approve: config.auto_approve_threshold,
            auto_reject: config.auto_reject_threshold,
            trust_step: config.trust_step,
            reject_reason_threshold: config.reject_reason_threshold,
            review_reason_threshold: config.review_reason_threshold,
            appeal_window: config.appeal_window(),
        }
    }

    /// Thresholds are snapped to 1e-9 so a step like 0.1 + 3 * 0.1 lands on
    /// 0.4 rather than 0.4000000000000001.
    pub fn adjusted_thresholds(&self, trust_level: u8) -> AdjustedThresholds {
        let bonus = trust_level as f64 * self.trust_step;
        AdjustedThresholds {
            reject_at: snap(self.auto_reject + bonus),
            approve_at: snap(self.auto_approve - bonus),
        }
    }

    /// Decide the outcome for one submission.
    pub fn decide(
        &self,
        submission_id: &str,
        signals: &SpamSignals,
        trust_level: u8,
        now: DateTime<Utc>,
    ) -> ModerationResult {
        let spam = clamp_unit(signals.overall_spam_probability);
        let thresholds = self.adjusted_thresholds(trust_level);

        let (status, confidence, reasons, appeal_deadline) = if spam >= thresholds.reject_at {
            (
                ModerationStatus::Rejected,
                spam,
                self.rejection_reasons(signals),
                Some(now + self.appeal_window),
            )
        } else if spam <= thresholds.approve_at {
            (
                ModerationStatus::Approved,
                1.0 - spam,
                vec![reasons::AUTOMATED_APPROVAL.to_string()],
                None,
            )
        } else {
            (
                ModerationStatus::PendingReview,
                (0.5 - spam).abs(),
                self.review_reasons(signals),
                Some(now + self.appeal_window),
            )
        };

        ModerationResult {
            submission_id: submission_id.to_string(),
            status,
            confidence: clamp_unit(confidence),
            reasons,
            reviewer_id: None,
            reviewed_at: None,
            appeal_deadline,
            reviewer_notes: None,
        }
    }

    /// Result for a submission whose analysis failed.
    pub fn system_error(&self, submission_id: &str, now: DateTime<Utc>) -> ModerationResult {
        ModerationResult::system_error(submission_id, now + self.appeal_window)
    }

    fn rejection_reasons(&self, signals: &SpamSignals) -> Vec<String> {
        let t = self.reject_reason_threshold;
        let c = &signals.content_analysis;

        let mut out: Vec<String> = [
            (c.keyword_spam_score >= t, reasons::SPAM_KEYWORDS_DETECTED),
            (c.repetition_score >= t, reasons::REPETITIVE_CONTENT),
            (c.link_spam_score >= t, reasons::SUSPICIOUS_LINKS),
            (c.sentiment_score >= t, reasons::INAPPROPRIATE_SENTIMENT),
            (
                behavior_score(&signals.behavioral_analysis) >= t,
                reasons::SUSPICIOUS_BEHAVIOR,
            ),
            (
                signals.reputation_factors.historical_violations >= t,
                reasons::VIOLATION_HISTORY,
            ),
        ]
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, code)| code.to_string())
        .collect();

        if out.is_empty() {
            out.push(reasons::AUTOMATED_SPAM_DETECTION.to_string());
        }
        out
    }

    fn review_reasons(&self, signals: &SpamSignals) -> Vec<String> {
        let t = self.review_reason_threshold;
        let c = &signals.content_analysis;

        let mut out: Vec<String> = [
            (c.keyword_spam_score >= t, reasons::POSSIBLE_SPAM_KEYWORDS),
            (c.repetition_score >= t, reasons::SOME_REPETITION),
            (c.link_spam_score >= t, reasons::MULTIPLE_LINKS),
            (c.sentiment_score >= t, reasons::SENTIMENT_CONCERNS),
            (
                behavior_score(&signals.behavioral_analysis) >= t,
                reasons::UNUSUAL_ACTIVITY,
            ),
            // trust level 0
            (
                signals.reputation_factors.user_trust_level < 0.25,
                reasons::NEW_USER_CONTENT,
            ),
        ]
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, code)| code.to_string())
        .collect();

        if out.is_empty() {
            out.push(reasons::ROUTINE_QUALITY_CHECK.to_string());
        }
        out
    }
}

fn snap(threshold: f64) -> f64 {
    (threshold * 1e9).round() / 1e9
}
