use shared::domain::ConversationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no conversation is active")]
    NoActiveConversation,
    #[error("no local user is configured; cannot send")]
    MissingLocalUser,
    #[error("message content is empty")]
    EmptyMessage,
    #[error("failed to fetch history for conversation {conversation_id}: {source}")]
    HistoryFetch {
        conversation_id: ConversationId,
        source: anyhow::Error,
    },
    #[error("sync engine is no longer running")]
    EngineClosed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("realtime url must start with ws:// or wss://: {0}")]
    InvalidUrl(String),
    #[error("failed to connect realtime channel: {0}")]
    Connect(String),
    #[error("realtime channel is not connected")]
    NotConnected,
    #[error("failed to encode {frame} frame: {source}")]
    Encode {
        frame: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to write {frame} frame: {reason}")]
    Send { frame: &'static str, reason: String },
}
