//! Reply selection: pick the single most confident entity above the threshold.

use crate::intent::{EntityCandidate, IntentResult};

/// Candidates at or below this confidence are never used.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// The chosen entity and the category it was found under. An empty category means nothing qualified.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectedEntity {
    pub category: String,
    pub candidate: EntityCandidate,
}

impl SelectedEntity {
    /// Nothing qualified: empty category, zero confidence.
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        self.category.is_empty()
    }

    pub fn confidence(&self) -> f64 {
        self.candidate.confidence
    }
}

/// Scan every candidate in service order and keep the first one with the highest confidence
/// strictly above [`CONFIDENCE_THRESHOLD`]. Later candidates with equal confidence do not win.
pub fn select_entity(result: &IntentResult) -> SelectedEntity {
    let mut top = SelectedEntity::sentinel();
    for (category, candidates) in &result.entities {
        for candidate in candidates {
            if candidate.confidence > CONFIDENCE_THRESHOLD && candidate.confidence > top.confidence()
            {
                top = SelectedEntity {
                    category: category.clone(),
                    candidate: candidate.clone(),
                };
            }
        }
    }
    top
}
