use shared::{domain::ConversationId, protocol::ClientFrame};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignal {
    Join(ConversationId),
    Leave(ConversationId),
}

impl RoomSignal {
    pub fn into_frame(self) -> ClientFrame {
        match self {
            Self::Join(id) => ClientFrame::JoinRoom(id),
            Self::Leave(id) => ClientFrame::LeaveRoom(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomState {
    Unsubscribed,
    SubscribedTo(ConversationId),
}

/// Tracks which conversation room the channel is joined to.
///
/// Every transition returns the signals to dispatch, in order. Joining is
/// only ever emitted from `Unsubscribed`, so the same room is never joined
/// twice without a leave in between.
#[derive(Debug)]
pub struct RoomSubscription {
    active: Option<ConversationId>,
    state: RoomState,
    connected: bool,
}

impl RoomSubscription {
    pub fn new(connected: bool) -> Self {
        Self {
            active: None,
            state: RoomState::Unsubscribed,
            connected,
        }
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn select(&mut self, next: Option<ConversationId>) -> Vec<RoomSignal> {
        if self.active == next {
            return Vec::new();
        }
        let mut signals = self.leave_current();
        self.active = next;
        signals.extend(self.join_active());
        debug!(active = ?self.active, ?signals, "room selection changed");
        signals
    }

    pub fn on_connection_changed(&mut self, connected: bool) -> Vec<RoomSignal> {
        self.connected = connected;
        if connected {
            self.join_active().into_iter().collect()
        } else {
            self.state = RoomState::Unsubscribed;
            Vec::new()
        }
    }

    pub fn teardown(&mut self) -> Vec<RoomSignal> {
        self.active = None;
        self.leave_current()
    }

    fn leave_current(&mut self) -> Vec<RoomSignal> {
        match std::mem::replace(&mut self.state, RoomState::Unsubscribed) {
            RoomState::SubscribedTo(id) => vec![RoomSignal::Leave(id)],
            RoomState::Unsubscribed => Vec::new(),
        }
    }

    fn join_active(&mut self) -> Option<RoomSignal> {
        if !self.connected || self.state != RoomState::Unsubscribed {
            return None;
        }
        let id = self.active.clone()?;
        self.state = RoomState::SubscribedTo(id.clone());
        Some(RoomSignal::Join(id))
    }
}

#[cfg(test)]
#[path = "tests/room_tests.rs"]
mod tests;
