// Signal extraction and combination.
//
// - Reputation factors: normalize a `UserReputation` to [0, 1] factors
// - Behaviour: `BehaviorSignalSource` port plus two implementations
// - Combiner: fixed weighted sum of all three signal groups
//
// The weights below are what existing threshold tunings were calibrated
// against. Each group sums to 1.0 and so does the top level.

use super::moderation_config::{ModerationConfig, PlaceholderBehavior};
use super::moderation_models::{
    BehavioralAnalysis, ContentAnalysis, ReputationFactors, SpamSignals, SubmissionRecord,
    UserReputation, MAX_TRUST_LEVEL,
};
use super::moderation_service::{ModerationError, SubmissionHistory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

// Content group
const W_KEYWORD: f64 = 0.3;
const W_REPETITION: f64 = 0.3;
const W_LINK: f64 = 0.2;
const W_SENTIMENT: f64 = 0.2;

// Behaviour group
const W_VELOCITY: f64 = 0.4;
const W_PATTERN: f64 = 0.4;
const W_TIMING: f64 = 0.2;

// Reputation group
const W_DISTRUST: f64 = 0.4;
const W_VIOLATIONS: f64 = 0.4;
const W_STANDING: f64 = 0.2;

// Top level
const W_CONTENT: f64 = 0.4;
const W_BEHAVIOR: f64 = 0.3;
const W_REPUTATION: f64 = 0.3;

const STRIKE_WEIGHT: f64 = 0.2;
const NEW_USER_STANDING: f64 = 0.5;
const MIN_TIMING_GAPS: usize = 3;

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Fingerprint normalized content so repeated posts can be spotted without
/// storing text. The value is persisted, so it must not depend on the toolchain:
/// first 8 bytes of SHA-256, big-endian.
pub fn content_hash(content: &str) -> u64 {
    let normalized = content.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

// ============================================================================
// REPUTATION FACTORS
// ============================================================================

pub fn reputation_factors(reputation: &UserReputation) -> ReputationFactors {
    let user_trust_level = reputation.effective_trust_level() as f64 / MAX_TRUST_LEVEL as f64;
    let historical_violations = (reputation.strikes as f64 * STRIKE_WEIGHT).min(1.0);
    let community_standing = if reputation.total_submissions > 0 {
        reputation.approved_submissions as f64 / reputation.total_submissions as f64
    } else {
        NEW_USER_STANDING
    };

    ReputationFactors {
        user_trust_level: clamp_unit(user_trust_level),
        historical_violations: clamp_unit(historical_violations),
        community_standing: clamp_unit(community_standing),
    }
}

// ============================================================================
// COMBINER
// ============================================================================

pub fn content_score(c: &ContentAnalysis) -> f64 {
    clamp_unit(
        W_KEYWORD * c.keyword_spam_score
            + W_REPETITION * c.repetition_score
            + W_LINK * c.link_spam_score
            + W_SENTIMENT * c.sentiment_score,
    )
}

pub fn behavior_score(b: &BehavioralAnalysis) -> f64 {
    clamp_unit(W_VELOCITY * b.velocity_score + W_PATTERN * b.pattern_score + W_TIMING * b.timing_score)
}

pub fn reputation_score(r: &ReputationFactors) -> f64 {
    clamp_unit(
        W_DISTRUST * (1.0 - r.user_trust_level)
            + W_VIOLATIONS * r.historical_violations
            + W_STANDING * (1.0 - r.community_standing),
    )
}

/// Merge the three signal groups into a full breakdown with the overall probability.
pub fn combine(
    content: ContentAnalysis,
    behavior: BehavioralAnalysis,
    reputation: ReputationFactors,
) -> SpamSignals {
    let overall = W_CONTENT * content_score(&content)
        + W_BEHAVIOR * behavior_score(&behavior)
        + W_REPUTATION * reputation_score(&reputation);

    SpamSignals {
        content_analysis: content,
        behavioral_analysis: behavior,
        reputation_factors: reputation,
        overall_spam_probability: clamp_unit(overall),
    }
}

// ============================================================================
// BEHAVIOUR (PORT + IMPLEMENTATIONS)
// ============================================================================

/// Source of submission-cadence signals for an author.
#[async_trait]
pub trait BehaviorSignalSource: Send + Sync {
    /// Signals for the author of `current`, as of its submission time.
    ///
    /// `current` itself never counts towards its own score.
    async fn behavior_signals(
        &self,
        current: &SubmissionRecord,
    ) -> Result<BehavioralAnalysis, ModerationError>;

    /// Called after each analysed submission so history-backed sources can learn.
    async fn observe(&self, _record: SubmissionRecord) -> Result<(), ModerationError> {
        Ok(())
    }
}

#[async_trait]
impl BehaviorSignalSource for Box<dyn BehaviorSignalSource> {
    async fn behavior_signals(
        &self,
        current: &SubmissionRecord,
    ) -> Result<BehavioralAnalysis, ModerationError> {
        (**self).behavior_signals(current).await
    }

    async fn observe(&self, record: SubmissionRecord) -> Result<(), ModerationError> {
        (**self).observe(record).await
    }
}

/// Fixed low scores, not backed by any history.
///
/// Used when no submission history is available. Contract for a real source:
/// fetch the author's submissions within a window, then score rate,
/// regularity and timing variance.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderBehaviorSignals {
    values: PlaceholderBehavior,
}

impl PlaceholderBehaviorSignals {
    pub fn new(values: PlaceholderBehavior) -> Self {
        Self { values }
    }
}

#[async_trait]
impl BehaviorSignalSource for PlaceholderBehaviorSignals {
    async fn behavior_signals(
        &self,
        _current: &SubmissionRecord,
    ) -> Result<BehavioralAnalysis, ModerationError> {
        Ok(BehavioralAnalysis {
            velocity_score: clamp_unit(self.values.velocity_score),
            pattern_score: clamp_unit(self.values.pattern_score),
            timing_score: clamp_unit(self.values.timing_score),
        })
    }
}

/// Scores behaviour from the author's earlier submissions.
///
/// The window ends at the scored submission's own timestamp and excludes it,
/// so re-scoring the same submission gives the same answer.
pub struct HistoryBehaviorAnalyzer<H: SubmissionHistory> {
    history: H,
    window: chrono::Duration,
    max_per_window: u32,
}

impl<H: SubmissionHistory> HistoryBehaviorAnalyzer<H> {
    pub fn new(history: H, config: &ModerationConfig) -> Self {
        Self {
            history,
            window: chrono::Duration::seconds(config.behavior_window_secs as i64),
            max_per_window: config.max_submissions_per_window,
        }
    }

    /// Pure scoring over an already-fetched window of records.
    ///
    /// - velocity: submissions in the window relative to the allowed cap
    /// - pattern: share of submissions that repeat earlier content
    /// - timing: how regular the gaps are (1 - coefficient of variation)
    pub fn score(records: &[SubmissionRecord], max_per_window: u32) -> BehavioralAnalysis {
        if records.is_empty() {
            return BehavioralAnalysis::default();
        }

        let count = records.len() as f64;
        let velocity_score = clamp_unit(count / max_per_window.max(1) as f64);

        let unique: HashSet<u64> = records.iter().map(|r| r.content_hash).collect();
        let pattern_score = clamp_unit((count - unique.len() as f64) / count);

        let mut times: Vec<DateTime<Utc>> = records.iter().map(|r| r.submitted_at).collect();
        times.sort();
        let gaps: Vec<f64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
            .collect();

        let timing_score = if gaps.len() < MIN_TIMING_GAPS {
            0.0
        } else {
            let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
            if mean <= 0.0 {
                // Everything landed at the same instant
                1.0
            } else {
                let variance =
                    gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
                clamp_unit(1.0 - variance.sqrt() / mean)
            }
        };

        BehavioralAnalysis {
            velocity_score,
            pattern_score,
            timing_score,
        }
    }
}

#[async_trait]
impl<H: SubmissionHistory> BehaviorSignalSource for HistoryBehaviorAnalyzer<H> {
    async fn behavior_signals(
        &self,
        current: &SubmissionRecord,
    ) -> Result<BehavioralAnalysis, ModerationError> {
        let since = current.submitted_at - self.window;
        let records: Vec<SubmissionRecord> = self
            .history
            .recent_submissions(&current.author_id, since)
            .await?
            .into_iter()
            .filter(|r| {
                r.submission_id != current.submission_id && r.submitted_at <= current.submitted_at
            })
            .collect();

        tracing::debug!(
            author_id = %current.author_id,
            prior = records.len(),
            "Scoring behaviour from submission history"
        );

        Ok(Self::score(&records, self.max_per_window))
    }

    async fn observe(&self, record: SubmissionRecord) -> Result<(), ModerationError> {
        self.history.record_submission(record).await
    }
}
