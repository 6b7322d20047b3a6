//! Client for the external topic matcher that maps a topic to a content hash.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use x402::X402Error;

#[derive(Serialize)]
struct MatchRequest<'a> {
    topic: &'a str,
}

#[derive(Deserialize)]
struct MatchResponse {
    best_match_hash: Option<String>,
}

pub struct TopicMatcher {
    http: reqwest::Client,
    url: String,
}

impl TopicMatcher {
    pub fn new(url: &str) -> Result<Self, X402Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| X402Error::HttpError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Hash of the content that best matches `topic`.
    pub async fn best_match(&self, topic: &str) -> Result<String, X402Error> {
        let resp = self
            .http
            .post(&self.url)
            .json(&MatchRequest { topic })
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("topic match failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(X402Error::HttpError(format!(
                "topic match returned {}",
                resp.status()
            )));
        }

        let body: MatchResponse = resp
            .json()
            .await
            .map_err(|e| X402Error::HttpError(format!("topic match parse failed: {e}")))?;

        body.best_match_hash
            .filter(|h| !h.is_empty())
            .ok_or_else(|| X402Error::HttpError(format!("no content matches topic {topic:?}")))
    }
}
