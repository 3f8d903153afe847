//! Inbound message from a channel: delivered to the dispatcher for intent lookup and reply.

/// A user message received from the chat platform.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// User who sent the message; replies are addressed here.
    pub sender_id: String,
    /// Conversation the message arrived in.
    pub channel_id: String,
    pub text: String,
}
