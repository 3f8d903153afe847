//! Slack channel: RTM WebSocket event stream for inbound messages, chat.postMessage for replies.

use crate::channels::handle::ChannelHandle;
use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const SLACK_API_BASE: &str = "https://slack.com/api";
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Message subtypes without new top-level user text: edits, deletions, bot posts, thread bookkeeping.
const IGNORED_SUBTYPES: &[&str] = &[
    "message_changed",
    "message_deleted",
    "message_replied",
    "bot_message",
];

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("slack websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "self")]
    bot: Option<RtmSelf>,
}

#[derive(Debug, Deserialize)]
struct RtmSelf {
    id: String,
}

/// Result of rtm.connect: where to open the socket and who we are.
#[derive(Debug, Clone)]
pub struct RtmSession {
    pub url: String,
    pub self_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// RTM event frame. Only the fields needed to recognise user messages are read.
#[derive(Debug, Default, Deserialize)]
pub struct RtmEvent {
    #[serde(default, rename = "type")]
    pub typ: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Why one socket session ended.
enum SessionEnd {
    /// Socket closed or server said goodbye; reconnect.
    Disconnected,
    /// Channel stopped or the dispatcher went away; leave the loop.
    Stop,
}

/// Slack connector: keeps an RTM session open and posts replies through the Web API.
pub struct SlackChannel {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    stopped: Notify,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(token: String, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| SLACK_API_BASE.to_string());
        Self {
            id: "slack".to_string(),
            token,
            api_base,
            running: AtomicBool::new(false),
            stopped: Notify::new(),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the RTM loop and forward user messages to the dispatcher. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("slack channel: starting rtm loop");
        tokio::spawn(async move {
            run_rtm_loop(self, inbound_tx).await;
        })
    }

    /// Call rtm.connect. Returns the WebSocket URL and the bot's own user id.
    pub async fn rtm_connect(&self) -> Result<RtmSession, SlackError> {
        let url = format!("{}/rtm.connect", self.api_base);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("rtm.connect failed: {} {}", status, body)));
        }
        let data: RtmConnectResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(format!(
                "rtm.connect: {}",
                data.error.unwrap_or_else(|| "ok: false".to_string())
            )));
        }
        let url = data
            .url
            .ok_or_else(|| SlackError::Api("rtm.connect returned no url".to_string()))?;
        Ok(RtmSession {
            url,
            self_id: data.bot.map(|b| b.id),
        })
    }

    /// Post a text message via chat.postMessage, as the bot user.
    pub async fn post_message(&self, recipient_id: &str, text: &str) -> Result<(), SlackError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let body = serde_json::json!({
            "channel": recipient_id,
            "text": text,
            "as_user": true,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("chat.postMessage failed: {} {}", status, body)));
        }
        let data: ApiResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(format!(
                "chat.postMessage: {}",
                data.error.unwrap_or_else(|| "ok: false".to_string())
            )));
        }
        Ok(())
    }

    /// Read one socket session until it ends, forwarding user messages.
    async fn read_session(
        &self,
        session: &RtmSession,
        inbound_tx: &mpsc::Sender<InboundMessage>,
    ) -> Result<SessionEnd, SlackError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(session.url.as_str()).await?;
        log::info!("slack channel: rtm socket connected");
        loop {
            let frame = tokio::select! {
                frame = ws.next() => frame,
                _ = self.stopped.notified() => {
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Stop);
                }
            };
            let Some(frame) = frame else {
                return Ok(SessionEnd::Disconnected);
            };
            let text = match frame? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(SessionEnd::Disconnected),
                _ => continue,
            };
            let event: RtmEvent = match serde_json::from_str(&text) {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("slack: skipping unparseable frame: {}", e);
                    continue;
                }
            };
            if event.typ.as_deref() == Some("goodbye") {
                log::info!("slack channel: server sent goodbye");
                return Ok(SessionEnd::Disconnected);
            }
            if let Some(inbound) = inbound_from_event(&event, session.self_id.as_deref()) {
                if inbound_tx.send(inbound).await.is_err() {
                    log::debug!("slack: inbound channel closed, stopping loop");
                    return Ok(SessionEnd::Stop);
                }
            }
        }
    }
}

/// Turn an RTM event into an inbound message when it is a plain message from a user other than the bot.
/// User subtypes such as `file_share`, `me_message` and `thread_broadcast` are kept.
pub fn inbound_from_event(event: &RtmEvent, self_id: Option<&str>) -> Option<InboundMessage> {
    if event.typ.as_deref() != Some("message") {
        return None;
    }
    if let Some(subtype) = event.subtype.as_deref() {
        if IGNORED_SUBTYPES.contains(&subtype) {
            return None;
        }
    }
    let user = event.user.as_deref()?;
    if Some(user) == self_id {
        return None;
    }
    Some(InboundMessage {
        sender_id: user.to_string(),
        channel_id: event.channel.clone().unwrap_or_default(),
        text: event.text.clone().unwrap_or_default(),
    })
}

async fn run_rtm_loop(channel: Arc<SlackChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    while channel.running() {
        let outcome = match channel.rtm_connect().await {
            Ok(session) => channel.read_session(&session, &inbound_tx).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(SessionEnd::Stop) => break,
            Ok(SessionEnd::Disconnected) => {
                log::info!("slack channel: rtm socket closed, reconnecting");
            }
            Err(e) => {
                log::warn!("slack rtm error: {}", e);
            }
        }
        if !channel.running() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = channel.stopped.notified() => break,
        }
    }
    log::info!("slack channel: rtm loop stopped");
}

#[async_trait]
impl ChannelHandle for SlackChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.notify_one();
    }

    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), String> {
        self.post_message(recipient_id, text)
            .await
            .map_err(|e| e.to_string())
    }
}
