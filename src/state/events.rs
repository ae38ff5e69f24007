//! Closed, tagged event enums for the realtime protocol.
//!
//! `ClientEvent` is everything a connection can send; `ServerEvent` is
//! everything the server can emit, whether over the connection's own
//! socket or fanned out through the pub/sub fabric. Both are `#[serde(tag
//! = "type")]` sum types rather than duck-typed JSON blobs, per the design
//! note calling out that ambiguity as something to close.

use serde::{Deserialize, Serialize};

use crate::db::MessageStatusState;
use crate::presence::PresenceStatus;

/// `ServerEvent` round-trips through the pub/sub fabric as JSON (published
/// by the engine that raised it, deserialized by every instance's local
/// forwarding task), so it derives `Deserialize` as well as `Serialize` —
/// unlike `ClientEvent`, which only ever arrives from a socket.

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename = "message:send")]
    MessageSend { conversation_id: String, content: String, temp_id: Option<String> },
    #[serde(rename = "message:edit")]
    MessageEdit { message_id: String, content: String },
    #[serde(rename = "message:delete")]
    MessageDelete { message_id: String },
    #[serde(rename = "message:delivered")]
    MessageDelivered { message_ids: Vec<String> },
    #[serde(rename = "message:read")]
    MessageRead {
        conversation_id: Option<String>,
        message_ids: Option<Vec<String>>,
    },
    #[serde(rename = "conversation:join")]
    ConversationJoin { conversation_id: String },
    #[serde(rename = "conversation:leave")]
    ConversationLeave { conversation_id: String },
    #[serde(rename = "presence:update")]
    PresenceUpdate { status: PresenceStatus },
    #[serde(rename = "heartbeat")]
    Heartbeat {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // Every variant's fields are plain owned data (String/i64/Option/Vec/
    // Copy enums), so `#[derive(Clone)]` above is exact — multi-device
    // fan-out clones one event per local connection.
    #[serde(rename = "auth:success")]
    AuthSuccess { user_id: String, session_id: String },

    #[serde(rename = "message:new")]
    MessageNew {
        id: String,
        conversation_id: String,
        sender_id: String,
        content: String,
        reply_to_id: Option<String>,
        created_at: i64,
        temp_id: Option<String>,
    },
    #[serde(rename = "message:sent")]
    MessageSent { temp_id: Option<String>, message_id: String, created_at: i64 },
    #[serde(rename = "message:edited")]
    MessageEdited { message_id: String, content: String, updated_at: i64 },
    #[serde(rename = "message:deleted")]
    MessageDeleted { message_id: String, conversation_id: String, deleted_at: i64 },
    #[serde(rename = "message:delivery-status")]
    MessageDeliveryStatus { message_ids: Vec<String>, user_id: String, status: MessageStatusState },
    #[serde(rename = "message:read-status")]
    MessageReadStatus { user_id: String, status: MessageStatusState, timestamp: i64 },
    #[serde(rename = "message:error")]
    MessageError {
        temp_id: Option<String>,
        code: String,
        message: String,
        retry_after: Option<u64>,
    },

    #[serde(rename = "presence:update")]
    PresenceUpdate { user_id: String, status: PresenceStatus, last_seen: Option<i64> },

    #[serde(rename = "conversation:participant-added")]
    ConversationParticipantAdded {
        conversation_id: String,
        participants: Vec<String>,
        added_by: String,
    },
    #[serde(rename = "conversation:participant-removed")]
    ConversationParticipantRemoved {
        conversation_id: String,
        user_id: String,
        removed_by: String,
        is_self_removal: bool,
    },
    #[serde(rename = "conversation:admin-promoted")]
    ConversationAdminPromoted { conversation_id: String, user_id: String, reason: String },
    #[serde(rename = "conversation:updated")]
    ConversationUpdated {
        conversation_id: String,
        name: Option<String>,
        avatar_url: Option<String>,
    },

    #[serde(rename = "force:disconnect")]
    ForceDisconnect { reason: String },
}
