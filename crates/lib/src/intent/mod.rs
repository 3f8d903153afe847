//! Intent recognition: result types and the resolver seam.
//!
//! An [`IntentResult`] maps entity category names (e.g. "greetings") to the scored candidates
//! the service returned, in the order the service returned them.

mod wit;

pub use wit::{WitClient, WitError};

use async_trait::async_trait;
use serde::Deserialize;

/// Value attached to an entity candidate. Services return arbitrary JSON here; only text values
/// can be used as knowledge queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Other(serde_json::Value),
}

impl Default for EntityValue {
    fn default() -> Self {
        EntityValue::Other(serde_json::Value::Null)
    }
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntityValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, for log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityValue::Text(_) => "text",
            EntityValue::Number(_) => "number",
            EntityValue::Bool(_) => "bool",
            EntityValue::Other(serde_json::Value::Null) => "null",
            EntityValue::Other(_) => "structured",
        }
    }
}

/// One scored interpretation of part of a message.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EntityCandidate {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub value: EntityValue,
}

impl EntityCandidate {
    pub fn new(value: EntityValue, confidence: f64) -> Self {
        Self { confidence, value }
    }
}

/// Category name -> candidates, in service order. Category names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntentResult {
    /// Message text as echoed by the service, when present.
    pub text: Option<String>,
    pub entities: Vec<(String, Vec<EntityCandidate>)>,
}

impl IntentResult {
    /// Build from (category, candidates) pairs. A repeated category replaces the earlier entry
    /// in place, like inserting into a map.
    pub fn from_entities<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<EntityCandidate>)>,
        S: Into<String>,
    {
        let mut out: Vec<(String, Vec<EntityCandidate>)> = Vec::new();
        for (category, candidates) in entities {
            let category = category.into();
            match out.iter_mut().find(|(c, _)| *c == category) {
                Some(slot) => slot.1 = candidates,
                None => out.push((category, candidates)),
            }
        }
        Self {
            text: None,
            entities: out,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Candidates for one category, if the service returned it.
    pub fn candidates(&self, category: &str) -> Option<&[EntityCandidate]> {
        self.entities
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, list)| list.as_slice())
    }
}

/// Sends message text to an intent service and returns its entity data.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve_intent(&self, text: &str) -> Result<IntentResult, WitError>;
}
