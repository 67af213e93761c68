use chrono::{DateTime, Utc};
use shared::domain::{ConversationId, Message, UserId};
use tracing::debug;

use crate::store::{MessageStore, ReplaceOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    Reconciled,
    Duplicate,
    Appended,
}

impl InboundDisposition {
    pub fn changed_store(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

/// Builds an optimistic message and appends it to `store`.
pub fn apply_local_send(
    store: &mut MessageStore,
    conversation_id: ConversationId,
    sender_id: UserId,
    content: &str,
    now: DateTime<Utc>,
) -> Option<Message> {
    if content.trim().is_empty() {
        return None;
    }
    let message = Message::optimistic(conversation_id, sender_id, content, now);
    store.append(message.clone());
    Some(message)
}

/// Classifies and applies one message pushed by the realtime channel.
///
/// The temp id is consulted before the durable id: an echo of our own send
/// must replace its optimistic entry rather than be appended next to it.
pub fn apply_inbound(store: &mut MessageStore, payload: Message) -> InboundDisposition {
    if let Some(temp_id) = payload.temp_id.clone() {
        if store.find_by_temp_id(&temp_id).is_some() {
            let outcome = store.replace_by_temp_id(&temp_id, payload);
            debug!(temp_id = %temp_id, ?outcome, "reconciled optimistic message");
            return match outcome {
                ReplaceOutcome::Ignored => InboundDisposition::Duplicate,
                ReplaceOutcome::Appended => InboundDisposition::Appended,
                ReplaceOutcome::Replaced | ReplaceOutcome::Collapsed => {
                    InboundDisposition::Reconciled
                }
            };
        }
    }

    if store.contains(&payload.id) {
        debug!(message_id = %payload.id, "dropping redelivered message");
        return InboundDisposition::Duplicate;
    }

    store.append(confirmed(payload));
    InboundDisposition::Appended
}

pub fn apply_history_page(store: &mut MessageStore, page: Vec<Message>) -> usize {
    store.prepend(page.into_iter().map(confirmed).collect())
}

/// Merges a re-fetched newest page behind the loaded messages. Entries
/// already in the store, pending ones included, are left where they are.
pub fn apply_latest_page(store: &mut MessageStore, page: Vec<Message>) -> usize {
    let mut added = 0;
    for message in page {
        if store.append(confirmed(message)) {
            added += 1;
        }
    }
    added
}

// Server-sourced messages are confirmed; a temp id on them belongs to the
// client that sent them.
fn confirmed(message: Message) -> Message {
    Message {
        temp_id: None,
        ..message
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
