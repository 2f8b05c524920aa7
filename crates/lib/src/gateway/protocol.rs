//! Activity wire types for POST /api/messages.

use crate::channels::{ConversationRef, EventKind, InboundEvent, OutboundEvent};
use serde::{Deserialize, Serialize};

/// Channel id used when an activity does not name one.
pub const DEFAULT_ACTIVITY_CHANNEL: &str = "http";

/// Inbound activity: `{ "type", "id"?, "text"?, "channelId"?, "conversation": { "id" }, "from"?, "recipient"? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub from: Option<ChannelAccount>,
    #[serde(default)]
    pub recipient: Option<ChannelAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Activity {
    /// Normalise to a turn event. Missing text is passed on as an empty string.
    pub fn to_inbound_event(&self) -> InboundEvent {
        InboundEvent {
            kind: EventKind::from_activity_type(&self.typ),
            text: self.text.clone().unwrap_or_default(),
            conversation: ConversationRef {
                channel_id: self
                    .channel_id
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ACTIVITY_CHANNEL.to_string()),
                conversation_id: self.conversation.id.clone(),
                reply_to_id: self.id.clone(),
            },
        }
    }
}

/// Outbound message activity returned in the response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyActivity {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    /// RFC 3339 UTC.
    pub timestamp: String,
    pub text: String,
    pub channel_id: String,
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Inbound `recipient` (the bot), when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    /// Inbound `from` (the user), when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
}

impl ReplyActivity {
    pub fn from_outbound(reply: OutboundEvent, inbound: &Activity) -> Self {
        Self {
            typ: "message".to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            text: reply.text,
            channel_id: reply.conversation.channel_id,
            conversation: ConversationAccount {
                id: reply.conversation.conversation_id,
            },
            reply_to_id: reply.conversation.reply_to_id,
            from: inbound.recipient.clone(),
            recipient: inbound.from.clone(),
        }
    }
}

/// Body of a successful /api/messages response. Empty for non-message activities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<ReplyActivity>,
}
