use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, Message, MessageId, ParticipantRole, ServiceId};

/// Wire shape of a message as the backend stores it. Field names follow the
/// backend's JSON conventions: camelCase, `_id` for the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender_role: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// The wire record does not repeat the conversation id; the caller knows
    /// which conversation it fetched.
    pub fn into_message(self, conversation_id: ConversationId) -> Message {
        Message {
            id: self.id,
            conversation_id,
            sender_role: self.sender_role,
            text: self.text,
            images: self.image_urls,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            read_at: self.read_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConversationRequest {
    pub service_id: ServiceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "_id")]
    pub id: ConversationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConversationResponse {
    pub conversation: ConversationRecord,
}

/// One page of history, ascending by `createdAt`. A missing cursor means no
/// older pages exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: MessageRecord,
}
