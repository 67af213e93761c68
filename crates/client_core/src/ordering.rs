use shared::domain::{Message, MessageId, UserId};

use crate::store::MessageStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub message: Message,
    pub first_in_sequence: bool,
    pub last_in_sequence: bool,
    pub is_own: bool,
    /// Still waiting for the server echo ("sending").
    pub pending: bool,
}

/// Display projection of a store: ascending by `created_at`, ties kept in
/// store order, with same-sender run boundaries marked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderingView {
    rows: Vec<DisplayRow>,
}

impl OrderingView {
    pub fn project(store: &MessageStore, me: Option<&UserId>) -> Self {
        Self::from_messages(store.as_slice(), me)
    }

    pub fn from_messages(messages: &[Message], me: Option<&UserId>) -> Self {
        let mut sorted: Vec<&Message> = messages.iter().collect();
        sorted.sort_by_key(|m| m.created_at);

        let rows = sorted
            .iter()
            .enumerate()
            .map(|(idx, message)| {
                let prev = idx.checked_sub(1).map(|i| sorted[i]);
                let next = sorted.get(idx + 1);
                DisplayRow {
                    message: (*message).clone(),
                    first_in_sequence: prev.map_or(true, |p| p.sender_id != message.sender_id),
                    last_in_sequence: next.map_or(true, |n| n.sender_id != message.sender_id),
                    is_own: me == Some(&message.sender_id),
                    pending: message.is_pending(),
                }
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.rows.iter().map(|row| row.message.id.clone()).collect()
    }

    pub fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.rows.iter().position(|row| &row.message.id == id)
    }
}
