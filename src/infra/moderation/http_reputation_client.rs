use crate::core::moderation::{ModerationError, ReputationEvent, ReputationStore, UserReputation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

/// Client for a remote account service that owns user reputations.
///
/// `GET {base}/users/{id}/reputation` and
/// `POST {base}/users/{id}/reputation/outcomes`.
pub struct HttpReputationClient {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct OutcomeBody<'a> {
    event: &'a str,
    at: DateTime<Utc>,
}

impl HttpReputationClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ModerationError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ModerationError::Config(format!("invalid reputation url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ModerationError::Config(format!(
                "reputation url cannot be a base: {}",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static(concat!("shared-thread-moderation/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ModerationError::Config(e.to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ModerationError::Config(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// `{base}/users/{user_id}/{tail...}`, with the id percent-encoded.
    fn user_url(&self, user_id: &str, tail: &[&str]) -> Result<Url, ModerationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ModerationError::Config("reputation url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("users")
            .push(user_id)
            .extend(tail);
        Ok(url)
    }
}

#[async_trait]
impl ReputationStore for HttpReputationClient {
    async fn get_reputation(&self, user_id: &str) -> Result<UserReputation, ModerationError> {
        let url = self.user_url(user_id, &["reputation"])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ModerationError::Upstream(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(UserReputation::neutral(user_id, Utc::now()));
        }
        if !resp.status().is_success() {
            return Err(ModerationError::Upstream(format!(
                "reputation service returned {} for {}",
                resp.status(),
                user_id
            )));
        }

        resp.json()
            .await
            .map_err(|e| ModerationError::Upstream(e.to_string()))
    }

    async fn record_outcome(
        &self,
        user_id: &str,
        event: ReputationEvent,
        at: DateTime<Utc>,
    ) -> Result<UserReputation, ModerationError> {
        let url = self.user_url(user_id, &["reputation", "outcomes"])?;
        let resp = self
            .client
            .post(url)
            .json(&OutcomeBody {
                event: event.as_str(),
                at,
            })
            .send()
            .await
            .map_err(|e| ModerationError::Upstream(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ModerationError::Upstream(format!(
                "reputation service returned {} recording {} for {}",
                resp.status(),
                event.as_str(),
                user_id
            )));
        }

        resp.json()
            .await
            .map_err(|e| ModerationError::Upstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_user_urls_under_base_path() {
        let client = HttpReputationClient::new("https://api.example.org/v1/", None).unwrap();

        let url = client.user_url("a b", &["reputation"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.org/v1/users/a%20b/reputation"
        );

        let url = client
            .user_url("u/1", &["reputation", "outcomes"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.org/v1/users/u%2F1/reputation/outcomes"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            HttpReputationClient::new("not a url", None),
            Err(ModerationError::Config(_))
        ));
        assert!(matches!(
            HttpReputationClient::new("mailto:staff@example.org", None),
            Err(ModerationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_upstream_error() {
        let client = HttpReputationClient::new("http://127.0.0.1:9/", None).unwrap();
        let err = client.get_reputation("u1").await.unwrap_err();
        assert!(matches!(err, ModerationError::Upstream(_)));
    }
}
