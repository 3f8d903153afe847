//! Wolfram|Alpha Spoken Results API client (`GET /v1/spoken`).

use super::{KnowledgeService, Units};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.wolframalpha.com";

/// Client for the Wolfram|Alpha short-answer APIs.
#[derive(Clone)]
pub struct WolframClient {
    base_url: String,
    app_id: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum WolframError {
    #[error("wolfram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("wolfram api error: {0}")]
    Api(String),
}

impl WolframClient {
    pub fn new(app_id: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            app_id,
            client: reqwest::Client::new(),
        }
    }

    /// GET /v1/spoken — plain-text answer phrased as a sentence, returned as sent. A non-2xx
    /// status means the query could not be interpreted or answered; the body then carries the reason.
    pub async fn spoken(&self, query: &str, units: Units) -> Result<String, WolframError> {
        let url = format!("{}/v1/spoken", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[
                ("appid", self.app_id.as_str()),
                ("i", query),
                ("units", units.as_str()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(WolframError::Api(format!("{} {}", status, body)));
        }
        Ok(res.text().await?)
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub(crate) fn cap_length(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl KnowledgeService for WolframClient {
    async fn spoken_answer(
        &self,
        query: &str,
        units: Units,
        max_result_length: usize,
    ) -> Result<String, WolframError> {
        let answer = self.spoken(query, units).await?;
        Ok(cap_length(&answer, max_result_length).to_string())
    }
}
