// Tunable knobs for the moderation pipeline.
//
// Thresholds and word lists live here rather than in the scoring code so a
// deployment can override them from a JSON file without a rebuild. Any field
// missing from the file falls back to the default below.

use super::moderation_service::ModerationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed stand-in values for behaviour scoring when no history is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderBehavior {
    pub velocity_score: f64,
    pub pattern_score: f64,
    pub timing_score: f64,
}

impl Default for PlaceholderBehavior {
    fn default() -> Self {
        Self {
            velocity_score: 0.1,
            pattern_score: 0.1,
            timing_score: 0.1,
        }
    }
}

/// Configuration for the whole moderation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Max spam score for instant approval (before trust adjustment)
    pub auto_approve_threshold: f64,
    /// Middle band marker; the review band is whatever falls between the other two
    pub human_review_threshold: f64,
    /// Min spam score for instant rejection (before trust adjustment)
    pub auto_reject_threshold: f64,
    /// Threshold shift per trust level
    pub trust_step: f64,
    /// Sub-score at or above which a rejection cites it
    pub reject_reason_threshold: f64,
    /// Sub-score at or above which a review routing cites it
    pub review_reason_threshold: f64,
    pub appeal_window_days: i64,
    /// Timeout applied to each collaborator call (reputation, history, audit)
    pub collaborator_timeout_ms: u64,
    pub max_content_chars: usize,

    pub spam_keywords: Vec<String>,
    pub shortener_domains: Vec<String>,
    pub negative_words: Vec<String>,
    pub promotional_words: Vec<String>,

    pub placeholder_behavior: PlaceholderBehavior,
    pub behavior_window_secs: u64,
    pub max_submissions_per_window: u32,

    /// Tag written into every audit record
    pub system_version: String,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.9,
            human_review_threshold: 0.5,
            auto_reject_threshold: 0.1,
            trust_step: 0.1,
            reject_reason_threshold: 0.5,
            review_reason_threshold: 0.3,
            appeal_window_days: 30,
            collaborator_timeout_ms: 2_000,
            max_content_chars: 100_000,
            spam_keywords: owned(&[
                "buy now",
                "click here",
                "free money",
                "limited time",
                "act now",
                "make money",
                "work from home",
                "earn cash",
                "guaranteed income",
                "no credit check",
                "risk free",
                "100% free",
                "order now",
                "special promotion",
                "you have been selected",
                "claim your prize",
                "crypto giveaway",
                "follow for follow",
            ]),
            shortener_domains: owned(&[
                "bit.ly",
                "tinyurl.com",
                "goo.gl",
                "ow.ly",
                "is.gd",
                "buff.ly",
                "rebrand.ly",
                "cutt.ly",
                "tempmail",
                "10minutemail",
                "guerrillamail",
                "mailinator",
            ]),
            negative_words: owned(&[
                "hate", "stupid", "idiot", "trash", "garbage", "pathetic", "worthless", "loser",
                "moron", "disgusting",
            ]),
            promotional_words: owned(&[
                "buy", "sale", "discount", "cheap", "deal", "promo", "coupon", "subscribe",
                "giveaway", "offer",
            ]),
            placeholder_behavior: PlaceholderBehavior::default(),
            behavior_window_secs: 3_600,
            max_submissions_per_window: 10,
            system_version: format!("moderation-engine/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ModerationConfig {
    /// Load overrides from a JSON file and validate the result.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModerationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ModerationError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ModerationError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ModerationError::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModerationError> {
        let unit_fields = [
            ("auto_approve_threshold", self.auto_approve_threshold),
            ("human_review_threshold", self.human_review_threshold),
            ("auto_reject_threshold", self.auto_reject_threshold),
            ("trust_step", self.trust_step),
            ("reject_reason_threshold", self.reject_reason_threshold),
            ("review_reason_threshold", self.review_reason_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModerationError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.appeal_window_days <= 0 {
            return Err(ModerationError::Config(
                "appeal_window_days must be positive".to_string(),
            ));
        }
        if self.behavior_window_secs == 0 || self.max_submissions_per_window == 0 {
            return Err(ModerationError::Config(
                "behaviour window and submission cap must be non-zero".to_string(),
            ));
        }
        if self.max_content_chars == 0 {
            return Err(ModerationError::Config(
                "max_content_chars must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn appeal_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.appeal_window_days)
    }

    pub fn collaborator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.collaborator_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ModerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auto_approve_threshold, 0.9);
        assert_eq!(config.auto_reject_threshold, 0.1);
        assert_eq!(config.appeal_window_days, 30);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ModerationConfig::from_json_str(
            r#"{ "spam_keywords": ["cheap essays"], "appeal_window_days": 14 }"#,
        )
        .unwrap();

        assert_eq!(config.spam_keywords, vec!["cheap essays".to_string()]);
        assert_eq!(config.appeal_window_days, 14);
        assert_eq!(config.trust_step, 0.1);
        assert!(!config.shortener_domains.is_empty());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = ModerationConfig::from_json_str(r#"{ "auto_reject_threshold": 1.5 }"#)
            .unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(&path, r#"{ "max_content_chars": 500 }"#).unwrap();

        let config = ModerationConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_content_chars, 500);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ModerationConfig::from_json_file("/nonexistent/moderation.json").unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }
}
