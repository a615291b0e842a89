//! codechat: a chat proxy in front of a code-generation inference server,
//! plus the conversation state that drives it.
//!
//! - [`proxy`] validates `/chat` requests and relays them upstream
//! - [`upstream`] talks to the inference server
//! - [`conversation`] keeps the bounded message history and the send cycle
//! - [`segments`] and [`render`] turn replies into prose/code blocks

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod proxy;
pub mod render;
pub mod segments;
pub mod types;
pub mod upstream;

pub use client::{ChatError, ChatReply, ChatResult, ChatTransport, ProxyClient};
pub use config::Config;
pub use conversation::{Conversation, Message, Phase};
pub use error::ProxyError;
pub use segments::{Segment, SegmentKind, split_reply};
