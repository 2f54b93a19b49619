// Content analyzer - extracts spam signals from the submitted text itself.
//
// Four independent scores, each clamped to [0, 1]:
// - keyword spam (phrase list + suspicious patterns)
// - repetition (words reused across the text)
// - link spam (link count + shortener/disposable domains)
// - sentiment (negative or promotional vocabulary)

use super::moderation_config::ModerationConfig;
use super::moderation_models::{ContentAnalysis, ContentSubmission};
use super::moderation_service::ModerationError;
use super::signals::clamp_unit;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const KEYWORD_HIT: f64 = 0.1;
const PATTERN_HIT: f64 = 0.05;
const MANY_LINKS_PENALTY: f64 = 0.3;
const MANY_LINKS_COUNT: usize = 3;
const SHORTENER_HIT: f64 = 0.2;
const SENTIMENT_HIT: f64 = 0.1;
const REPETITION_WEIGHT: f64 = 0.5;
const MIN_REPEATED_WORD_LEN: usize = 4;

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("Invalid URL regex"));

/// Suspicious pattern classes. Every match instance counts.
static SPAM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Shouting
        r"[A-Z]{5,}",
        // Repeated exclamation marks
        r"!{2,}",
        // Dollar amounts
        r"\$\d[\d,]*(\.\d+)?",
        // Raw URLs
        r"https?://\S+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid spam pattern regex"))
    .collect()
});

/// Anything that can produce content signals for a submission.
///
/// The pipeline only depends on this trait so alternative analyzers (or
/// failing ones in tests) can be swapped in.
pub trait ContentSignalSource: Send + Sync {
    fn analyze(&self, submission: &ContentSubmission) -> Result<ContentAnalysis, ModerationError>;
}

/// Rule-based analyzer driven by the word lists in `ModerationConfig`.
#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    spam_keywords: Vec<String>,
    shortener_domains: Vec<String>,
    negative_words: Vec<String>,
    promotional_words: Vec<String>,
    max_content_chars: usize,
}

impl ContentAnalyzer {
    pub fn new(config: &ModerationConfig) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            spam_keywords: lower(&config.spam_keywords),
            shortener_domains: lower(&config.shortener_domains),
            negative_words: lower(&config.negative_words),
            promotional_words: lower(&config.promotional_words),
            max_content_chars: config.max_content_chars,
        }
    }

    /// 0.1 per listed phrase present plus 0.05 per pattern match.
    pub fn keyword_spam_score(&self, content: &str) -> f64 {
        let lowered = content.to_lowercase();

        let keyword_hits = self
            .spam_keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .count();

        let pattern_hits: usize = SPAM_PATTERNS
            .iter()
            .map(|pattern| pattern.find_iter(content).count())
            .sum();

        clamp_unit(keyword_hits as f64 * KEYWORD_HIT + pattern_hits as f64 * PATTERN_HIT)
    }

    /// Sum of `(count / total_words) * 0.5` over every repeated word longer than
    /// three characters. Clamped like the other scores even though the sum
    /// tops out at 0.5 when every word repeats.
    pub fn repetition_score(&self, content: &str) -> f64 {
        let words: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return 0.0;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in words
            .iter()
            .filter(|w| w.chars().count() >= MIN_REPEATED_WORD_LEN)
        {
            *counts.entry(word.as_str()).or_insert(0) += 1;
        }

        let total = words.len() as f64;
        let score: f64 = counts
            .values()
            .filter(|&&count| count > 1)
            .map(|&count| (count as f64 / total) * REPETITION_WEIGHT)
            .sum();

        clamp_unit(score)
    }

    /// Links found in the text plus attached media URLs.
    pub fn link_spam_score(&self, content: &str, media_urls: &[String]) -> f64 {
        let links: Vec<&str> = URL_REGEX
            .find_iter(content)
            .map(|m| m.as_str())
            .chain(media_urls.iter().map(String::as_str))
            .collect();

        let mut score = 0.0;
        if links.len() > MANY_LINKS_COUNT {
            score += MANY_LINKS_PENALTY;
        }

        let suspicious = links
            .iter()
            .filter(|link| {
                let link = link.to_lowercase();
                self.shortener_domains
                    .iter()
                    .any(|domain| link.contains(domain.as_str()))
            })
            .count();
        score += suspicious as f64 * SHORTENER_HIT;

        clamp_unit(score)
    }

    /// Max of the negative and promotional buckets.
    pub fn sentiment_score(&self, content: &str) -> f64 {
        let lowered = content.to_lowercase();
        let mut negative = 0.0;
        let mut promotional = 0.0;

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            if self.negative_words.iter().any(|w| w == word) {
                negative += SENTIMENT_HIT;
            }
            if self.promotional_words.iter().any(|w| w == word) {
                promotional += SENTIMENT_HIT;
            }
        }

        clamp_unit(f64::max(negative, promotional))
    }
}

impl ContentSignalSource for ContentAnalyzer {
    fn analyze(&self, submission: &ContentSubmission) -> Result<ContentAnalysis, ModerationError> {
        let content = submission.content.as_str();
        let length = content.chars().count();
        if length > self.max_content_chars {
            return Err(ModerationError::ContentTooLarge {
                length,
                max: self.max_content_chars,
            });
        }

        Ok(ContentAnalysis {
            keyword_spam_score: self.keyword_spam_score(content),
            repetition_score: self.repetition_score(content),
            link_spam_score: self.link_spam_score(content, &submission.metadata.media_urls),
            sentiment_score: self.sentiment_score(content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{SubmissionMetadata, SubmissionType};
    use chrono::Utc;

    fn analyzer() -> ContentAnalyzer {
        ContentAnalyzer::new(&ModerationConfig::default())
    }

    fn submission(content: &str) -> ContentSubmission {
        ContentSubmission {
            id: "sub-1".to_string(),
            kind: SubmissionType::Work,
            content: content.to_string(),
            metadata: SubmissionMetadata::default(),
            author_id: "author-1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn clean_prose_scores_zero() {
        let text = "The lighthouse keeper walked along the shore at dusk, listening to gulls.";
        let result = analyzer().analyze(&submission(text)).unwrap();

        assert_eq!(result, ContentAnalysis::default());
    }

    #[test]
    fn keywords_are_case_insensitive_and_counted_once_each() {
        let a = analyzer();
        assert!(approx(a.keyword_spam_score("please Click Here"), 0.1));
        assert!(approx(a.keyword_spam_score("click here, click here"), 0.1));
        assert!(approx(
            a.keyword_spam_score("click here to make money, act now"),
            0.3
        ));
    }

    #[test]
    fn pattern_matches_add_per_instance() {
        let a = analyzer();
        // two exclamation runs
        assert!(approx(a.keyword_spam_score("wow!! really!!"), 0.1));
        // caps run + dollar amount
        assert!(approx(a.keyword_spam_score("AMAZING deal for $50"), 0.1));
    }

    #[test]
    fn keyword_score_saturates() {
        let text = "buy now click here free money limited time act now make money \
                    work from home earn cash risk free order now claim your prize";
        assert_eq!(analyzer().keyword_spam_score(text), 1.0);
    }

    #[test]
    fn repetition_ignores_short_words() {
        let a = analyzer();
        assert_eq!(a.repetition_score("the the the the cat cat"), 0.0);
    }

    #[test]
    fn repetition_uses_share_of_total_words() {
        // "river" appears 2 of 4 words: (2/4) * 0.5 = 0.25
        let score = analyzer().repetition_score("River flows, river bends");
        // "river" vs "river" after lower-casing; "flows," and "bends" unique
        assert!(approx(score, 0.25));
    }

    #[test]
    fn repetition_of_every_word_scores_half() {
        // 4/8 * 0.5 for each of the two words
        let score = analyzer().repetition_score("spam spam spam spam eggs eggs eggs eggs");
        assert!(approx(score, 0.5));
    }

    #[test]
    fn empty_content_is_clean() {
        let a = analyzer();
        assert_eq!(a.repetition_score(""), 0.0);
        assert_eq!(a.keyword_spam_score(""), 0.0);
        assert_eq!(a.sentiment_score(""), 0.0);
        assert_eq!(a.link_spam_score("", &[]), 0.0);
    }

    #[test]
    fn many_links_and_shorteners() {
        let a = analyzer();
        let plain = "https://a.org https://b.org https://c.org https://d.org";
        assert!(approx(a.link_spam_score(plain, &[]), 0.3));

        let one_short = "read https://bit.ly/abc";
        assert!(approx(a.link_spam_score(one_short, &[]), 0.2));

        let three_links = "https://a.org https://b.org https://c.org";
        assert_eq!(a.link_spam_score(three_links, &[]), 0.0);
    }

    #[test]
    fn media_urls_count_as_links() {
        let media = vec![
            "https://tinyurl.com/img".to_string(),
            "https://cdn.example.org/cover.png".to_string(),
        ];
        let score = analyzer().link_spam_score("see attached", &media);
        assert!(approx(score, 0.2));
    }

    #[test]
    fn sentiment_takes_the_larger_bucket() {
        let a = analyzer();
        assert!(approx(a.sentiment_score("this is stupid garbage"), 0.2));
        assert!(approx(
            a.sentiment_score("Buy now, huge sale, discount inside!"),
            0.3
        ));
        assert!(approx(a.sentiment_score("stupid sale"), 0.1));
    }

    #[test]
    fn boundary_shortener_example() {
        let text = "BUY NOW!!! https://bit.ly/x https://bit.ly/y https://bit.ly/z https://bit.ly/w";
        let result = analyzer().analyze(&submission(text)).unwrap();

        assert!(result.link_spam_score >= 0.3 + 0.2);
        assert!(result.keyword_spam_score >= 0.1);
        assert_eq!(result.link_spam_score, 1.0);
    }

    #[test]
    fn oversized_content_is_an_error() {
        let config = ModerationConfig {
            max_content_chars: 10,
            ..Default::default()
        };
        let err = ContentAnalyzer::new(&config)
            .analyze(&submission("this is definitely longer than ten"))
            .unwrap_err();

        assert!(matches!(err, ModerationError::ContentTooLarge { max: 10, .. }));
    }
}
