use serde::{Deserialize, Serialize};

use crate::{
    domain::{Conversation, ConversationId, Message},
    error::ApiError,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    SendMessage(Message),
    JoinRoom(ConversationId),
    LeaveRoom(ConversationId),
}

impl ClientFrame {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::JoinRoom(_) => "join_room",
            Self::LeaveRoom(_) => "leave_room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(Message),
    Error(ApiError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPagination {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_cursor: Option<String>,
    #[serde(default)]
    pub total_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesPage {
    pub data: Vec<Message>,
    pub pagination: CursorPagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationsPage {
    pub data: Vec<Conversation>,
    pub pagination: CursorPagination,
}

/// Query string shared by the message history and conversation list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_cursor: Option<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            before_cursor: None,
            after_cursor: None,
        }
    }
}

impl PageQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit: clamp_page_limit(limit),
            ..Self::default()
        }
    }

    pub fn before(cursor: impl Into<String>, limit: u32) -> Self {
        Self {
            limit: clamp_page_limit(limit),
            before_cursor: Some(cursor.into()),
            after_cursor: None,
        }
    }
}

/// The result is always in `1..=MAX_PAGE_LIMIT`.
pub fn clamp_page_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}
