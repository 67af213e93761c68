use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Conversation, ConversationId},
    protocol::{ClientFrame, ConversationsPage, MessagesPage, PageQuery},
};

pub mod engine;
pub mod error;
pub mod history;
pub mod ordering;
pub mod pagination;
pub mod reconcile;
pub mod room;
pub mod scroll_anchor;
pub mod settings;
pub mod store;
pub mod transport;

pub use engine::{EngineConfig, EngineHandle, SyncEngine, SyncEvent};
pub use error::{SyncError, TransportError};
pub use history::HttpHistoryApi;
pub use ordering::{DisplayRow, OrderingView};
pub use pagination::LoadOutcome;
pub use room::RoomSignal;
pub use scroll_anchor::{ContentLayout, PreparedScroll, ScrollAnchor, ScrollMetrics};
pub use settings::{load_settings_from, ClientSettings};
pub use store::StoreMutation;
pub use transport::{ChannelSignal, ReconnectBackoff, WsConnection};

#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        query: &PageQuery,
    ) -> Result<MessagesPage>;
    async fn list_conversations(&self, query: &PageQuery) -> Result<ConversationsPage>;
    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation>;
}

pub struct MissingHistoryApi;

#[async_trait]
impl HistoryApi for MissingHistoryApi {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        _query: &PageQuery,
    ) -> Result<MessagesPage> {
        Err(anyhow!(
            "history api unavailable for conversation {conversation_id}"
        ))
    }

    async fn list_conversations(&self, _query: &PageQuery) -> Result<ConversationsPage> {
        Err(anyhow!("history api is unavailable"))
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        Err(anyhow!(
            "history api unavailable for conversation {conversation_id}"
        ))
    }
}

/// Outbound half of the realtime channel. Inbound traffic arrives separately
/// as [`ChannelSignal`]s.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn emit(&self, frame: ClientFrame) -> Result<()>;
}

pub struct MissingChannelTransport;

#[async_trait]
impl ChannelTransport for MissingChannelTransport {
    async fn emit(&self, frame: ClientFrame) -> Result<()> {
        Err(anyhow!(
            "realtime channel is unavailable; dropped {} frame",
            frame.name()
        ))
    }
}
