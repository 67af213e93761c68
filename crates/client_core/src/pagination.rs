use std::collections::{HashMap, HashSet};

use shared::{
    domain::{ConversationId, Message},
    protocol::{clamp_page_limit, MessagesPage, PageQuery},
};
use tracing::debug;

use crate::store::MessageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Latest,
    Older,
    Refresh,
}

/// One issued history request. The conversation it was issued for travels
/// with it so a late response can be recognised as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    pub conversation_id: ConversationId,
    pub kind: FetchKind,
    pub query: PageQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadDecision {
    Fetch(FetchTicket),
    AlreadyLoading,
    Exhausted,
}

#[derive(Debug)]
pub enum Completion {
    Merge(Vec<Message>),
    Stale,
    Failed(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { added: usize, has_more: bool },
    AlreadyLoading,
    Exhausted,
    Stale,
}

#[derive(Debug)]
pub struct PaginationCursor {
    page_limit: u32,
    in_flight: HashMap<ConversationId, u64>,
    exhausted: HashSet<ConversationId>,
    next_ticket: u64,
}

impl PaginationCursor {
    pub fn new(page_limit: u32) -> Self {
        Self {
            page_limit: clamp_page_limit(page_limit),
            in_flight: HashMap::new(),
            exhausted: HashSet::new(),
            next_ticket: 1,
        }
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    pub fn is_loading(&self, conversation_id: &ConversationId) -> bool {
        self.in_flight.contains_key(conversation_id)
    }

    pub fn has_more(&self, conversation_id: &ConversationId) -> bool {
        !self.exhausted.contains(conversation_id)
    }

    pub fn begin_latest(&mut self, conversation_id: &ConversationId) -> LoadDecision {
        if self.is_loading(conversation_id) {
            return LoadDecision::AlreadyLoading;
        }
        let query = PageQuery::latest(self.page_limit);
        LoadDecision::Fetch(self.issue(conversation_id, FetchKind::Latest, query))
    }

    /// Refreshes are not single-flight and never touch the in-flight guard or
    /// the exhausted flag.
    pub fn begin_refresh(&mut self, conversation_id: &ConversationId) -> FetchTicket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        FetchTicket {
            id,
            conversation_id: conversation_id.clone(),
            kind: FetchKind::Refresh,
            query: PageQuery::latest(self.page_limit),
        }
    }

    /// Starts a fetch for the page before the earliest confirmed message in
    /// `store`. Falls back to the latest page when nothing is loaded yet.
    pub fn begin_older(
        &mut self,
        conversation_id: &ConversationId,
        store: Option<&MessageStore>,
    ) -> LoadDecision {
        if self.is_loading(conversation_id) {
            return LoadDecision::AlreadyLoading;
        }
        if !self.has_more(conversation_id) {
            return LoadDecision::Exhausted;
        }
        match store.and_then(MessageStore::earliest_confirmed_id) {
            Some(cursor) => {
                let query = PageQuery::before(cursor.as_str(), self.page_limit);
                LoadDecision::Fetch(self.issue(conversation_id, FetchKind::Older, query))
            }
            None => {
                let query = PageQuery::latest(self.page_limit);
                LoadDecision::Fetch(self.issue(conversation_id, FetchKind::Latest, query))
            }
        }
    }

    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        active: Option<&ConversationId>,
        result: anyhow::Result<MessagesPage>,
    ) -> Completion {
        if self.in_flight.get(&ticket.conversation_id) == Some(&ticket.id) {
            self.in_flight.remove(&ticket.conversation_id);
        }

        if active != Some(&ticket.conversation_id) {
            debug!(
                conversation_id = %ticket.conversation_id,
                ticket = ticket.id,
                "discarding history page for inactive conversation"
            );
            return Completion::Stale;
        }

        match result {
            Ok(page) => {
                let short = page.data.len() < ticket.query.limit as usize;
                if short && ticket.kind != FetchKind::Refresh {
                    self.exhausted.insert(ticket.conversation_id.clone());
                }
                Completion::Merge(page.data)
            }
            Err(err) => Completion::Failed(err),
        }
    }

    pub fn reset(&mut self, conversation_id: &ConversationId) {
        self.exhausted.remove(conversation_id);
    }

    fn issue(
        &mut self,
        conversation_id: &ConversationId,
        kind: FetchKind,
        query: PageQuery,
    ) -> FetchTicket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.insert(conversation_id.clone(), id);
        FetchTicket {
            id,
            conversation_id: conversation_id.clone(),
            kind,
            query,
        }
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
