//! Reply actions: map the selected entity's category to what gets posted back.

use crate::selector::SelectedEntity;

/// Category that triggers the greeting.
pub const GREETINGS_CATEGORY: &str = "greetings";
/// Category whose value is forwarded to the knowledge service.
pub const KNOWLEDGE_QUERY_CATEGORY: &str = "wolfram_search_query";

pub const GREETING_TEXT: &str = "hello username";
pub const FALLBACK_TEXT: &str = "oops...I don't know";

/// Cap on knowledge answer length, in characters.
pub const MAX_ANSWER_LENGTH: usize = 1000;

/// What to do for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPlan {
    /// Post [`GREETING_TEXT`].
    Greeting,
    /// Ask the knowledge service and post its answer.
    KnowledgeQuery(String),
    /// Knowledge query category, but the value is not text. Nothing is posted.
    InvalidQuery { kind: &'static str },
    /// Post [`FALLBACK_TEXT`].
    Fallback,
}

/// Decide the reply for a selected entity. Pure; no I/O.
pub fn plan_reply(selected: &SelectedEntity) -> ReplyPlan {
    match selected.category.as_str() {
        GREETINGS_CATEGORY => ReplyPlan::Greeting,
        KNOWLEDGE_QUERY_CATEGORY => match selected.candidate.value.as_text() {
            Some(query) => ReplyPlan::KnowledgeQuery(query.to_string()),
            None => ReplyPlan::InvalidQuery {
                kind: selected.candidate.value.kind(),
            },
        },
        _ => ReplyPlan::Fallback,
    }
}
