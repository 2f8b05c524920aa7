//! Gateway: HTTP host for the relay.
//!
//! Single port serves the health probe, the activity endpoint (`POST /api/messages`),
//! and the Telegram webhook. Failure replies to users are produced here, not in the relay.

mod protocol;
mod server;

pub use protocol::{ActivitiesResponse, Activity, ChannelAccount, ConversationAccount, ReplyActivity};
pub use server::{run_gateway, GENERIC_ERROR_REPLY};
