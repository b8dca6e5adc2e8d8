use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved prefix for client-generated temporary message ids. Server ids are
/// backend-assigned object ids and never start with this.
pub const LOCAL_ID_PREFIX: &str = "local-";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(ConversationId);
id_newtype!(MessageId);
id_newtype!(UserId);
id_newtype!(ServiceId);

impl MessageId {
    /// Temporary identity for an optimistic message awaiting confirmation.
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Provider,
    Customer,
}

impl ParticipantRole {
    pub fn counterpart(self) -> Self {
        match self {
            Self::Provider => Self::Customer,
            Self::Customer => Self::Provider,
        }
    }
}

/// A durable thread between a provider and a customer, scoped to the service
/// that originated it. Owned by the backend; the client only references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub provider_id: UserId,
    pub customer_id: UserId,
    pub service_id: Option<ServiceId>,
}

/// A single timeline entry carrying text, images, or both (never neither).
/// After creation the client only ever fills in `delivered_at`/`read_at`;
/// sender, text and images are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_role: ParticipantRole,
    pub text: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Optimistic outgoing message: temporary id, provisional timestamp, no
    /// receipts. Replaced wholesale by the server record on confirmation.
    pub fn outgoing(
        conversation_id: ConversationId,
        sender_role: ParticipantRole,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::local(),
            conversation_id,
            sender_role,
            text: Some(text.into()),
            images: Vec::new(),
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.is_local()
    }

    /// Fills receipt timestamps that are still unset. Receipts are monotonic:
    /// once set they are never unset or overwritten by a later sync.
    pub fn merge_receipts(
        &mut self,
        delivered_at: Option<DateTime<Utc>>,
        read_at: Option<DateTime<Utc>>,
    ) {
        if self.delivered_at.is_none() {
            self.delivered_at = delivered_at;
        }
        if self.read_at.is_none() {
            self.read_at = read_at;
        }
    }
}
