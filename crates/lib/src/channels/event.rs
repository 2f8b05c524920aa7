//! Turn events exchanged between a channel and the relay.

use serde::{Deserialize, Serialize};

/// Kind of an inbound activity. Only `Message` is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Message,
    ConversationUpdate,
    Typing,
    EndOfConversation,
    Event,
    Other(String),
}

impl EventKind {
    /// Parse the wire activity type (`"message"`, `"conversationUpdate"`, ...).
    /// Matches the Bot Framework strings exactly; any other spelling is `Other`.
    pub fn from_activity_type(s: &str) -> Self {
        let s = s.trim();
        match s {
            "message" => EventKind::Message,
            "conversationUpdate" => EventKind::ConversationUpdate,
            "typing" => EventKind::Typing,
            "endOfConversation" => EventKind::EndOfConversation,
            "event" => EventKind::Event,
            _ => EventKind::Other(s.to_string()),
        }
    }

    pub fn as_activity_type(&self) -> &str {
        match self {
            EventKind::Message => "message",
            EventKind::ConversationUpdate => "conversationUpdate",
            EventKind::Typing => "typing",
            EventKind::EndOfConversation => "endOfConversation",
            EventKind::Event => "event",
            EventKind::Other(s) => s,
        }
    }
}

/// Where a turn came from and where its reply goes. Not interpreted by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub channel_id: String,
    pub conversation_id: String,
    /// Id of the inbound activity, when the channel supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

/// One inbound activity from a channel.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub text: String,
    pub conversation: ConversationRef,
}

impl InboundEvent {
    /// A `Message` event without a reply-to id.
    pub fn message(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            text: text.into(),
            conversation: ConversationRef {
                channel_id: channel_id.into(),
                conversation_id: conversation_id.into(),
                reply_to_id: None,
            },
        }
    }
}

/// Reply produced by the relay for a message turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub text: String,
    pub conversation: ConversationRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_activity_types() {
        assert_eq!(EventKind::from_activity_type("message"), EventKind::Message);
        assert_eq!(
            EventKind::from_activity_type("conversationUpdate"),
            EventKind::ConversationUpdate
        );
        assert_eq!(
            EventKind::from_activity_type("endOfConversation"),
            EventKind::EndOfConversation
        );
        assert_eq!(EventKind::from_activity_type("typing"), EventKind::Typing);
    }

    #[test]
    fn activity_type_match_is_case_sensitive() {
        assert_eq!(
            EventKind::from_activity_type("Typing"),
            EventKind::Other("Typing".to_string())
        );
        assert_eq!(
            EventKind::from_activity_type("MESSAGE"),
            EventKind::Other("MESSAGE".to_string())
        );
        assert_eq!(
            EventKind::from_activity_type("conversationupdate"),
            EventKind::Other("conversationupdate".to_string())
        );
    }

    #[test]
    fn unknown_type_keeps_original_text() {
        let kind = EventKind::from_activity_type("installationUpdate");
        assert_eq!(kind, EventKind::Other("installationUpdate".to_string()));
        assert_eq!(kind.as_activity_type(), "installationUpdate");
    }
}
