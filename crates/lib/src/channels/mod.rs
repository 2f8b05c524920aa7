//! Communication channels (HTTP activities, Telegram).
//!
//! Turn event types, the channel handle trait, and the registry the gateway uses
//! to deliver replies. Inbound events are queued to the gateway, which runs the relay.

mod event;
mod registry;
mod telegram;

pub use event::{ConversationRef, EventKind, InboundEvent, OutboundEvent};
pub use registry::{ChannelHandle, ChannelRegistry};
pub use telegram::{TelegramChannel, TelegramUpdate};
