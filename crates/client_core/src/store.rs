use std::collections::{HashMap, HashSet};

use shared::domain::{ConversationId, Message, MessageId, TempId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The confirmed id was already present in another slot, so the optimistic
    /// entry was removed instead.
    Collapsed,
    Appended,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMutation {
    Appended,
    Reconciled,
    Prepended { added: usize },
    Loaded { added: usize },
}

/// Physical order: appends at the back, history pages at the front,
/// reconciliations in place. No two entries share an `id`.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.contains(id) {
            return None;
        }
        self.entries.iter().find(|m| &m.id == id)
    }

    pub fn find_by_temp_id(&self, temp_id: &TempId) -> Option<&Message> {
        self.position_of_temp_id(temp_id).map(|idx| &self.entries[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }

    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter(|m| m.is_pending())
    }

    /// Id of the oldest confirmed message, used as the backward cursor.
    pub fn earliest_confirmed_id(&self) -> Option<&MessageId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_pending())
            .min_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then(ia.cmp(ib)))
            .map(|(_, m)| &m.id)
    }

    pub fn append(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        self.entries.push(message);
        true
    }

    pub fn replace_by_temp_id(&mut self, temp_id: &TempId, confirmed: Message) -> ReplaceOutcome {
        let Some(idx) = self.position_of_temp_id(temp_id) else {
            let confirmed = Message {
                temp_id: None,
                ..confirmed
            };
            return if self.append(confirmed) {
                ReplaceOutcome::Appended
            } else {
                ReplaceOutcome::Ignored
            };
        };

        let previous_id = self.entries[idx].id.clone();
        if confirmed.id != previous_id && self.ids.contains(&confirmed.id) {
            self.entries.remove(idx);
            self.ids.remove(&previous_id);
            return ReplaceOutcome::Collapsed;
        }

        self.ids.remove(&previous_id);
        self.ids.insert(confirmed.id.clone());
        self.entries[idx] = Message {
            temp_id: None,
            ..confirmed
        };
        ReplaceOutcome::Replaced
    }

    pub fn prepend(&mut self, batch: Vec<Message>) -> usize {
        let mut fresh = Vec::with_capacity(batch.len());
        for message in batch {
            if self.ids.insert(message.id.clone()) {
                fresh.push(message);
            }
        }
        let added = fresh.len();
        if added > 0 {
            fresh.append(&mut self.entries);
            self.entries = fresh;
        }
        added
    }

    fn position_of_temp_id(&self, temp_id: &TempId) -> Option<usize> {
        self.entries
            .iter()
            .position(|m| m.temp_id.as_ref() == Some(temp_id))
    }
}

#[derive(Debug, Default)]
pub struct ConversationStores {
    stores: HashMap<ConversationId, MessageStore>,
}

impl ConversationStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, conversation_id: &ConversationId) -> Option<&MessageStore> {
        self.stores.get(conversation_id)
    }

    pub fn store_mut(&mut self, conversation_id: &ConversationId) -> &mut MessageStore {
        self.stores.entry(conversation_id.clone()).or_default()
    }

    pub fn is_empty_for(&self, conversation_id: &ConversationId) -> bool {
        self.stores
            .get(conversation_id)
            .map_or(true, MessageStore::is_empty)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
