//! Outbound side of a channel connector.

use async_trait::async_trait;

/// Handle to a running channel (stop, send message).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "slack").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a recipient (user or conversation id).
    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), String>;
}
