//! Message dispatch: one independent task per inbound message that resolves intent, selects an
//! entity, and posts the reply.
//!
//! Service clients are injected as trait objects so any of them can be replaced (e.g. in tests).

use crate::channels::{ChannelHandle, InboundMessage};
use crate::config::DispatchConfig;
use crate::intent::{IntentResolver, WitError};
use crate::knowledge::{KnowledgeService, Units, WolframError};
use crate::reply::{self, ReplyPlan, FALLBACK_TEXT, GREETING_TEXT, MAX_ANSWER_LENGTH};
use crate::selector::select_entity;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Options controlling dispatch behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOptions {
    /// Bound on concurrently processed messages; `None` spawns without limit.
    pub max_in_flight: Option<usize>,
    /// Post the fallback text when the knowledge service fails instead of staying silent.
    pub fallback_on_knowledge_error: bool,
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(c: &DispatchConfig) -> Self {
        Self {
            max_in_flight: c.max_in_flight.filter(|n| *n > 0),
            fallback_on_knowledge_error: c.fallback_on_knowledge_error,
        }
    }
}

/// Why a message got no reply. Every variant is terminal for that message.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("intent lookup failed: {0}")]
    Resolver(#[from] WitError),
    #[error("knowledge query failed: {0}")]
    Knowledge(#[from] WolframError),
    #[error("invalid knowledge query: {0}")]
    Validation(String),
    #[error("posting reply failed: {0}")]
    Post(String),
}

/// Text posted for a handled message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub recipient_id: String,
    pub text: String,
}

/// Routes inbound messages through intent lookup and reply selection.
#[derive(Clone)]
pub struct Dispatcher {
    resolver: Arc<dyn IntentResolver>,
    knowledge: Arc<dyn KnowledgeService>,
    channel: Arc<dyn ChannelHandle>,
    options: DispatchOptions,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn IntentResolver>,
        knowledge: Arc<dyn KnowledgeService>,
        channel: Arc<dyn ChannelHandle>,
        options: DispatchOptions,
    ) -> Self {
        let limiter = options
            .max_in_flight
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            resolver,
            knowledge,
            channel,
            options,
            limiter,
        }
    }

    /// Receive messages until the sender side closes, spawning one task per message.
    /// Returns after every spawned task has finished.
    pub async fn run(&self, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        let mut tasks = JoinSet::new();
        while let Some(msg) = inbound_rx.recv().await {
            let permit = match &self.limiter {
                Some(limiter) => match limiter.clone().acquire_owned().await {
                    Ok(p) => Some(p),
                    Err(_) => break,
                },
                None => None,
            };
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                this.process(msg).await;
            });
            while tasks.try_join_next().is_some() {}
        }
        log::debug!("dispatcher: inbound closed, waiting for {} task(s)", tasks.len());
        while tasks.join_next().await.is_some() {}
    }

    /// Handle one message and log the outcome. Never fails; errors end processing for this message only.
    pub async fn process(&self, msg: InboundMessage) {
        match self.handle_message(&msg).await {
            Ok(reply) => {
                log::debug!("replied to {} ({} chars)", reply.recipient_id, reply.text.len());
            }
            Err(DispatchError::Post(e)) => {
                log::warn!("reply to {} not delivered: {}", msg.sender_id, e);
            }
            Err(e) => {
                log::warn!("no reply for message from {}: {}", msg.sender_id, e);
            }
        }
    }

    /// Resolve intent, select an entity, and post the reply. Any error means nothing was posted.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<Reply, DispatchError> {
        let result = self.resolver.resolve_intent(&msg.text).await?;
        let selected = select_entity(&result);
        log::debug!(
            "message from {} in {}: category {:?} confidence {:.3}",
            msg.sender_id,
            msg.channel_id,
            selected.category,
            selected.confidence()
        );
        let text = match reply::plan_reply(&selected) {
            ReplyPlan::Greeting => GREETING_TEXT.to_string(),
            ReplyPlan::Fallback => FALLBACK_TEXT.to_string(),
            ReplyPlan::InvalidQuery { kind } => {
                return Err(DispatchError::Validation(format!(
                    "expected text value, got {}",
                    kind
                )));
            }
            ReplyPlan::KnowledgeQuery(query) => {
                match self
                    .knowledge
                    .spoken_answer(&query, Units::Metric, MAX_ANSWER_LENGTH)
                    .await
                {
                    Ok(answer) => answer,
                    Err(e) if self.options.fallback_on_knowledge_error => {
                        log::warn!("knowledge query failed, sending fallback: {}", e);
                        FALLBACK_TEXT.to_string()
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        self.post(&msg.sender_id, text).await
    }

    async fn post(&self, recipient_id: &str, text: String) -> Result<Reply, DispatchError> {
        self.channel
            .send_message(recipient_id, &text)
            .await
            .map_err(DispatchError::Post)?;
        Ok(Reply {
            recipient_id: recipient_id.to_string(),
            text,
        })
    }
}
