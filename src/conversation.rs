//! In-memory conversation state and the send cycle around it.
//!
//! One cycle runs `Idle → Submitting → Awaiting → Resolved → Idle`. While a
//! request is in flight the conversation holds exactly one pending assistant
//! placeholder as its last message, and refuses new submissions.

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::client::{ChatReply, ChatResult, ChatTransport};
use crate::segments::{Segment, SegmentKind, split_reply};
use crate::types::{ChatMessage, ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Role};

/// Messages forwarded with each request (five user/assistant pairs).
pub const HISTORY_WINDOW: usize = 10;

pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Awaiting,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: OffsetDateTime,
    pub pending: bool,
    pub inference_time_ms: Option<f64>,
}

impl Message {
    /// Renderable pieces of this message. User text is never fence-split.
    pub fn segments(&self) -> Vec<Segment> {
        match self.role {
            Role::Assistant => split_reply(&self.content, self.inference_time_ms),
            Role::User => vec![Segment {
                kind: SegmentKind::Prose,
                text: self.content.clone(),
                language: None,
                inference_time_ms: None,
            }],
        }
    }

    fn to_wire(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
    welcome_id: Option<u64>,
    input: String,
    phase: Phase,
    cycle: Vec<Phase>,
    banner: Option<String>,
    max_tokens: u32,
    temperature: f64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            welcome_id: None,
            input: String::new(),
            phase: Phase::Idle,
            cycle: Vec::new(),
            banner: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Start with an assistant greeting that is shown but never sent upstream.
    pub fn with_welcome(mut self, text: impl Into<String>) -> Self {
        let id = self.push(Role::Assistant, text.into(), false, None);
        self.welcome_id = Some(id);
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f64) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases entered during the current or most recent send cycle.
    pub fn cycle_phases(&self) -> &[Phase] {
        &self.cycle
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_enabled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Resolved)
    }

    /// Replace the input text. Ignored while a request is in flight.
    pub fn set_input(&mut self, text: impl Into<String>) -> bool {
        if !self.input_enabled() {
            return false;
        }
        self.input = text.into();
        true
    }

    pub fn can_submit(&self) -> bool {
        self.input_enabled() && !self.input.trim().is_empty()
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn pending(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.pending)
    }

    pub fn is_welcome(&self, message: &Message) -> bool {
        self.welcome_id == Some(message.id)
    }

    /// Forwardable history plus `next`, cut to the last [`HISTORY_WINDOW`].
    pub fn history_with(&self, next: ChatMessage) -> Vec<ChatMessage> {
        let mut history: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| !m.pending && !self.is_welcome(m))
            .map(Message::to_wire)
            .collect();
        history.push(next);
        let excess = history.len().saturating_sub(HISTORY_WINDOW);
        history.drain(..excess);
        history
    }

    /// Take the current input and move into `Awaiting`.
    ///
    /// Returns the request to send, or `None` when there is nothing to submit
    /// or a request is already in flight.
    pub fn begin_submit(&mut self) -> Option<ChatRequest> {
        if !self.can_submit() {
            return None;
        }
        self.cycle.clear();
        self.set_phase(Phase::Submitting);
        self.banner = None;

        let text = std::mem::take(&mut self.input).trim().to_string();
        let messages = self.history_with(ChatMessage {
            role: Role::User,
            content: text.clone(),
        });

        self.push(Role::User, text, false, None);
        self.push(Role::Assistant, String::new(), true, None);
        self.set_phase(Phase::Awaiting);

        Some(ChatRequest {
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }

    /// Replace the placeholder with the outcome and return to `Idle`.
    pub fn resolve(&mut self, outcome: ChatResult<ChatReply>) -> Option<&Message> {
        if self.phase != Phase::Awaiting {
            warn!(phase = ?self.phase, "reply arrived with no request in flight");
            return None;
        }

        if self.messages.last().is_some_and(|m| m.pending) {
            self.messages.pop();
        }

        match outcome {
            Ok(reply) => {
                info!(
                    tokens = reply.tokens_generated,
                    inference_time_ms = reply.inference_time_ms,
                    "reply received"
                );
                self.push(
                    Role::Assistant,
                    reply.text,
                    false,
                    Some(reply.inference_time_ms),
                );
            }
            Err(err) => {
                warn!(error = %err, "chat request failed");
                self.push(
                    Role::Assistant,
                    format!("{ERROR_PREFIX}{err}"),
                    false,
                    None,
                );
                self.banner = Some(err.to_string());
            }
        }

        self.set_phase(Phase::Resolved);
        self.set_phase(Phase::Idle);
        self.messages.last()
    }

    /// Run a whole cycle for the current input against `transport`.
    pub async fn send<T>(&mut self, transport: &T) -> Option<&Message>
    where
        T: ChatTransport + ?Sized,
    {
        let request = self.begin_submit()?;
        let outcome = transport.send(&request).await;
        self.resolve(outcome)
    }

    fn push(
        &mut self,
        role: Role,
        content: String,
        pending: bool,
        inference_time_ms: Option<f64>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role,
            content,
            timestamp: OffsetDateTime::now_utc(),
            pending,
            inference_time_ms,
        });
        id
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "conversation phase");
        self.phase = phase;
        self.cycle.push(phase);
    }
}
