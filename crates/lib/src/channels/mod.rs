//! Communication channels (Slack).
//!
//! A connector turns the platform's event stream into [`InboundMessage`]s on an mpsc channel
//! and exposes a [`ChannelHandle`] for posting replies.

mod handle;
mod inbound;
mod slack;

pub use handle::ChannelHandle;
pub use inbound::InboundMessage;
pub use slack::{inbound_from_event, RtmEvent, RtmSession, SlackChannel, SlackError};
