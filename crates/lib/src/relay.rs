//! Relay turn: forward a message to the answer provider and reply with the top answer.
//!
//! Single-turn processing: one request and one reply, no conversation state. Non-message
//! events (conversation updates, typing, ...) are ignored without touching the provider.

use crate::channels::{ChannelHandle, EventKind, InboundEvent, OutboundEvent};
use crate::config::DEFAULT_FALLBACK_ANSWER;
use crate::qna::{AnswerProvider, QnaError};
use std::sync::Arc;

/// Failure of a relayed turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Answer(#[from] QnaError),
    #[error("sending reply failed: {0}")]
    Send(String),
}

/// Relays message turns to one answer provider.
#[derive(Clone)]
pub struct Relay {
    provider: Arc<dyn AnswerProvider>,
    fallback: String,
}

impl Relay {
    pub fn new(provider: Arc<dyn AnswerProvider>) -> Self {
        Self {
            provider,
            fallback: DEFAULT_FALLBACK_ANSWER.to_string(),
        }
    }

    /// Reply text used when the provider returns no answers.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Build the reply for one inbound event. `None` for anything but a message.
    /// Provider errors are returned as-is; no retry.
    pub async fn handle_turn(&self, event: &InboundEvent) -> Result<Option<OutboundEvent>, QnaError> {
        match event.kind {
            EventKind::Message => {}
            ref other => {
                log::debug!(
                    "relay: ignoring {} event on {}/{}",
                    other.as_activity_type(),
                    event.conversation.channel_id,
                    event.conversation.conversation_id
                );
                return Ok(None);
            }
        }

        let answers = self.provider.get_answers(&event.text).await?;
        let text = match answers.into_iter().next() {
            Some(top) => {
                log::info!(
                    "relay: answered on {}/{} (score {:.2})",
                    event.conversation.channel_id,
                    event.conversation.conversation_id,
                    top.score
                );
                top.answer
            }
            None => {
                log::info!(
                    "relay: no answer on {}/{}, sending fallback",
                    event.conversation.channel_id,
                    event.conversation.conversation_id
                );
                self.fallback.clone()
            }
        };

        Ok(Some(OutboundEvent {
            text,
            conversation: event.conversation.clone(),
        }))
    }

    /// Handle the event and deliver the reply (if any) through `channel`, exactly once.
    pub async fn run_turn(
        &self,
        event: &InboundEvent,
        channel: &dyn ChannelHandle,
    ) -> Result<Option<OutboundEvent>, TurnError> {
        let Some(reply) = self.handle_turn(event).await? else {
            return Ok(None);
        };
        channel.send(&reply).await.map_err(TurnError::Send)?;
        Ok(Some(reply))
    }
}
