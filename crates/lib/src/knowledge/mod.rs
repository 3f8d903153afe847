//! Knowledge queries: the service seam and the Wolfram|Alpha client.

mod wolfram;

pub use wolfram::{WolframClient, WolframError};

use async_trait::async_trait;

/// Unit system requested for numeric answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Metric,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Units::Metric => "metric",
        }
    }
}

/// Answers free-text questions with a short spoken-style sentence.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    /// Answer `query`; the returned text is at most `max_result_length` characters.
    async fn spoken_answer(
        &self,
        query: &str,
        units: Units,
        max_result_length: usize,
    ) -> Result<String, WolframError>;
}
