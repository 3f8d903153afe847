//! Relay core library — Slack connector, intent and knowledge clients, reply selection and
//! dispatch used by the CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod intent;
pub mod knowledge;
pub mod reply;
pub mod selector;
