//! Wit.ai client (https://api.wit.ai by default).
//! Only the `GET /message` endpoint is used.

use super::{EntityCandidate, IntentResolver, IntentResult};
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.wit.ai";
/// API version pinned in every request; selects the `entities` map response format.
const DEFAULT_API_VERSION: &str = "20170307";

/// Client for the Wit.ai HTTP API.
#[derive(Clone)]
pub struct WitClient {
    base_url: String,
    api_version: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum WitError {
    #[error("wit.ai request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("wit.ai api error: {0}")]
    Api(String),
    #[error("wit.ai response malformed: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default, rename = "_text", alias = "text")]
    text: Option<String>,
    #[serde(default)]
    entities: serde_json::Map<String, serde_json::Value>,
}

impl WitClient {
    pub fn new(token: String, base_url: Option<String>, api_version: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// GET /message — extract entities from one message. Text is sent verbatim, empty included.
    pub async fn message(&self, text: &str) -> Result<IntentResult, WitError> {
        let url = format!("{}/message", self.base_url);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("v", self.api_version.as_str()), ("q", text)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(WitError::Api(format!("{} {}", status, body)));
        }
        let data: MessageResponse = res.json().await?;
        parse_entities(data)
    }
}

/// Convert the raw entities object into an ordered result. Relies on serde_json's
/// `preserve_order` so categories keep the order the service sent them in.
fn parse_entities(data: MessageResponse) -> Result<IntentResult, WitError> {
    let mut entities = Vec::with_capacity(data.entities.len());
    for (category, raw) in data.entities {
        let candidates: Vec<EntityCandidate> = serde_json::from_value(raw)
            .map_err(|e| WitError::Decode(format!("entity {}: {}", category, e)))?;
        entities.push((category, candidates));
    }
    Ok(IntentResult {
        text: data.text,
        entities,
    })
}

#[async_trait]
impl IntentResolver for WitClient {
    async fn resolve_intent(&self, text: &str) -> Result<IntentResult, WitError> {
        self.message(text).await
    }
}
