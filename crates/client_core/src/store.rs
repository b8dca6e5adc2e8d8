use shared::domain::{Message, MessageId};

/// The ordered, deduplicated in-memory message collection for one
/// conversation. Every other component reads or mutates through this type.
///
/// Invariants:
/// - ascending `created_at`, ties broken by insertion order;
/// - no two entries share an id;
/// - an optimistic entry and its confirmed form never coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn optimistic_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic()).count()
    }

    /// Inserts at the stable sorted position. If the id is already present
    /// the entry is not duplicated; its receipt fields are merged instead.
    /// Returns whether a new entry was added.
    pub fn insert(&mut self, message: Message) -> bool {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            existing.merge_receipts(message.delivered_at, message.read_at);
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        true
    }

    /// Idempotent bulk insert; returns how many entries were actually new.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = Message>) -> usize {
        batch
            .into_iter()
            .filter(|message| self.insert(message.clone()))
            .count()
    }

    /// Substitutes the server-confirmed record for the optimistic entry: a
    /// single replacement, never an append. If the confirmed id already
    /// arrived through a concurrent refresh, the optimistic entry is simply
    /// dropped so the message never has two representations.
    pub fn confirm(&mut self, local_id: &MessageId, confirmed: Message) -> bool {
        if self.remove(local_id).is_none() {
            return false;
        }
        self.insert(confirmed);
        true
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let at = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(at))
    }
}
