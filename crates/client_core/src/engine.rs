use std::{ops::ControlFlow, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use shared::{
    domain::{ConversationId, Message, UserId},
    error::ApiError,
    protocol::{ClientFrame, MessagesPage, ServerFrame},
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    ordering::OrderingView,
    pagination::{Completion, FetchKind, FetchTicket, LoadDecision, LoadOutcome, PaginationCursor},
    reconcile::{self, InboundDisposition},
    room::{RoomSignal, RoomSubscription},
    settings::ClientSettings,
    store::{ConversationStores, StoreMutation},
    transport::ChannelSignal,
    ChannelTransport, HistoryApi,
};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StoreChanged {
        conversation_id: ConversationId,
        mutation: StoreMutation,
    },
    Room(RoomSignal),
    ConnectionChanged {
        connected: bool,
    },
    Server(ApiError),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub local_user: Option<UserId>,
    pub page_size: u32,
    pub event_buffer: usize,
}

impl From<&ClientSettings> for EngineConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            local_user: settings.user_id.clone(),
            page_size: settings.page_size,
            event_buffer: settings.event_buffer,
        }
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Select {
        conversation_id: Option<ConversationId>,
        reply: Reply<()>,
    },
    Send {
        content: String,
        reply: Reply<Result<Message, SyncError>>,
    },
    LoadOlder {
        conversation_id: ConversationId,
        reply: Reply<Result<LoadOutcome, SyncError>>,
    },
    Snapshot {
        conversation_id: ConversationId,
        reply: Reply<Vec<Message>>,
    },
    View {
        conversation_id: ConversationId,
        reply: Reply<OrderingView>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

struct FetchDone {
    ticket: FetchTicket,
    result: Result<MessagesPage>,
    reply: Option<Reply<Result<LoadOutcome, SyncError>>>,
}

pub struct SyncEngine;

impl SyncEngine {
    /// Starts the actor and returns a handle to it. The actor stops, leaving
    /// its room, on [`EngineHandle::shutdown`] or once every handle is dropped.
    pub fn spawn(
        config: EngineConfig,
        transport: Arc<dyn ChannelTransport>,
        history: Arc<dyn HistoryApi>,
        inbound: mpsc::Receiver<ChannelSignal>,
    ) -> EngineHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (fetches_tx, fetches_rx) = mpsc::unbounded_channel();

        let actor = EngineActor {
            local_user: config.local_user,
            transport,
            history,
            stores: ConversationStores::new(),
            cursor: PaginationCursor::new(config.page_size),
            rooms: RoomSubscription::new(false),
            events: events.clone(),
            fetches: fetches_tx,
        };
        tokio::spawn(actor.run(commands_rx, Some(inbound), fetches_rx));

        EngineHandle {
            commands: commands_tx,
            events,
        }
    }
}

#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SyncEvent>,
}

impl EngineHandle {
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn select_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<(), SyncError> {
        self.request(|reply| Command::Select {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn send_message(&self, content: impl Into<String>) -> Result<Message, SyncError> {
        let content = content.into();
        self.request(|reply| Command::Send { content, reply })
            .await?
    }

    pub async fn load_older(
        &self,
        conversation_id: ConversationId,
    ) -> Result<LoadOutcome, SyncError> {
        self.request(|reply| Command::LoadOlder {
            conversation_id,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self, conversation_id: ConversationId) -> Result<Vec<Message>, SyncError> {
        self.request(|reply| Command::Snapshot {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn ordered_view(
        &self,
        conversation_id: ConversationId,
    ) -> Result<OrderingView, SyncError> {
        self.request(|reply| Command::View {
            conversation_id,
            reply,
        })
        .await
    }

    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        rx.await.map_err(|_| SyncError::EngineClosed)
    }
}

struct EngineActor {
    local_user: Option<UserId>,
    transport: Arc<dyn ChannelTransport>,
    history: Arc<dyn HistoryApi>,
    stores: ConversationStores,
    cursor: PaginationCursor,
    rooms: RoomSubscription,
    events: broadcast::Sender<SyncEvent>,
    fetches: mpsc::UnboundedSender<FetchDone>,
}

async fn next_signal(inbound: &mut Option<mpsc::Receiver<ChannelSignal>>) -> Option<ChannelSignal> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: Option<mpsc::Receiver<ChannelSignal>>,
        mut fetches: mpsc::UnboundedReceiver<FetchDone>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            return;
                        }
                    }
                    None => break,
                },
                signal = next_signal(&mut inbound) => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => {
                        inbound = None;
                        self.handle_signal(ChannelSignal::Disconnected).await;
                    }
                },
                Some(done) = fetches.recv() => self.handle_fetch_done(done),
            }
        }
        debug!("all engine handles dropped");
        self.teardown().await;
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Select {
                conversation_id,
                reply,
            } => {
                self.select(conversation_id).await;
                let _ = reply.send(());
            }
            Command::Send { content, reply } => match self.apply_local_send(&content) {
                Ok(message) => {
                    let _ = reply.send(Ok(message.clone()));
                    self.dispatch_send(message).await;
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::LoadOlder {
                conversation_id,
                reply,
            } => self.load_older(conversation_id, reply),
            Command::Snapshot {
                conversation_id,
                reply,
            } => {
                let messages = self
                    .stores
                    .store(&conversation_id)
                    .map(|store| store.as_slice().to_vec())
                    .unwrap_or_default();
                let _ = reply.send(messages);
            }
            Command::View {
                conversation_id,
                reply,
            } => {
                let view = self
                    .stores
                    .store(&conversation_id)
                    .map(|store| OrderingView::project(store, self.local_user.as_ref()))
                    .unwrap_or_default();
                let _ = reply.send(view);
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn select(&mut self, next: Option<ConversationId>) {
        let changed = self.rooms.active() != next.as_ref();
        let signals = self.rooms.select(next.clone());
        self.dispatch_room_signals(signals).await;

        if let Some(conversation_id) = next {
            if changed || self.stores.is_empty_for(&conversation_id) {
                self.sync_latest(&conversation_id);
            }
        }
    }

    // The channel only delivers while joined: every activation and every
    // rejoin re-reads the newest page.
    fn sync_latest(&mut self, conversation_id: &ConversationId) {
        if !self.stores.is_empty_for(conversation_id) {
            let ticket = self.cursor.begin_refresh(conversation_id);
            self.spawn_fetch(ticket, None);
            return;
        }
        if self.cursor.is_loading(conversation_id) {
            return;
        }
        self.cursor.reset(conversation_id);
        match self.cursor.begin_latest(conversation_id) {
            LoadDecision::Fetch(ticket) => self.spawn_fetch(ticket, None),
            decision => debug!(conversation_id = %conversation_id, ?decision, "initial load not started"),
        }
    }

    fn apply_local_send(&mut self, content: &str) -> Result<Message, SyncError> {
        let conversation_id = self
            .rooms
            .active()
            .cloned()
            .ok_or(SyncError::NoActiveConversation)?;
        let sender_id = self.local_user.clone().ok_or(SyncError::MissingLocalUser)?;
        let store = self.stores.store_mut(&conversation_id);
        let message =
            reconcile::apply_local_send(store, conversation_id.clone(), sender_id, content, Utc::now())
                .ok_or(SyncError::EmptyMessage)?;
        info!(
            conversation_id = %conversation_id,
            temp_id = ?message.temp_id,
            "queued optimistic message"
        );
        self.publish(SyncEvent::StoreChanged {
            conversation_id,
            mutation: StoreMutation::Appended,
        });
        Ok(message)
    }

    async fn dispatch_send(&mut self, message: Message) {
        let temp_id = message.temp_id.clone();
        if let Err(err) = self.transport.emit(ClientFrame::SendMessage(message)).await {
            warn!(temp_id = ?temp_id, "failed to dispatch message: {err:#}");
            self.publish(SyncEvent::Error(format!("failed to send message: {err}")));
        }
    }

    fn load_older(
        &mut self,
        conversation_id: ConversationId,
        reply: Reply<Result<LoadOutcome, SyncError>>,
    ) {
        if self.rooms.active() != Some(&conversation_id) {
            let _ = reply.send(Ok(LoadOutcome::Stale));
            return;
        }
        match self
            .cursor
            .begin_older(&conversation_id, self.stores.store(&conversation_id))
        {
            LoadDecision::Fetch(ticket) => self.spawn_fetch(ticket, Some(reply)),
            LoadDecision::AlreadyLoading => {
                debug!(conversation_id = %conversation_id, "history load already in flight");
                let _ = reply.send(Ok(LoadOutcome::AlreadyLoading));
            }
            LoadDecision::Exhausted => {
                let _ = reply.send(Ok(LoadOutcome::Exhausted));
            }
        }
    }

    fn spawn_fetch(
        &self,
        ticket: FetchTicket,
        reply: Option<Reply<Result<LoadOutcome, SyncError>>>,
    ) {
        let history = Arc::clone(&self.history);
        let done = self.fetches.clone();
        tokio::spawn(async move {
            let result = history
                .fetch_messages(&ticket.conversation_id, &ticket.query)
                .await;
            let _ = done.send(FetchDone {
                ticket,
                result,
                reply,
            });
        });
    }

    fn handle_fetch_done(&mut self, done: FetchDone) {
        let FetchDone {
            ticket,
            result,
            reply,
        } = done;
        let conversation_id = ticket.conversation_id.clone();

        let outcome = match self.cursor.complete(&ticket, self.rooms.active(), result) {
            Completion::Stale => Ok(LoadOutcome::Stale),
            Completion::Failed(source) => {
                warn!(conversation_id = %conversation_id, "history fetch failed: {source:#}");
                Err(SyncError::HistoryFetch {
                    conversation_id: conversation_id.clone(),
                    source,
                })
            }
            Completion::Merge(page) => {
                let store = self.stores.store_mut(&conversation_id);
                let was_empty = store.is_empty();
                let (added, mutation) = match ticket.kind {
                    FetchKind::Refresh if !was_empty => {
                        (reconcile::apply_latest_page(store, page), StoreMutation::Appended)
                    }
                    kind => {
                        let added = reconcile::apply_history_page(store, page);
                        if was_empty && kind != FetchKind::Older {
                            (added, StoreMutation::Loaded { added })
                        } else {
                            (added, StoreMutation::Prepended { added })
                        }
                    }
                };
                if added > 0 {
                    self.publish(SyncEvent::StoreChanged {
                        conversation_id: conversation_id.clone(),
                        mutation,
                    });
                }
                Ok(LoadOutcome::Loaded {
                    added,
                    has_more: self.cursor.has_more(&conversation_id),
                })
            }
        };

        match reply {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => {
                if let Err(err) = outcome {
                    self.publish(SyncEvent::Error(err.to_string()));
                }
            }
        }
    }

    async fn handle_signal(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected | ChannelSignal::Disconnected => {
                let connected = signal == ChannelSignal::Connected;
                if connected == self.rooms.is_connected() {
                    return;
                }
                self.publish(SyncEvent::ConnectionChanged { connected });
                let signals = self.rooms.on_connection_changed(connected);
                let rejoined: Vec<ConversationId> = signals
                    .iter()
                    .filter_map(|signal| match signal {
                        RoomSignal::Join(conversation_id) => Some(conversation_id.clone()),
                        RoomSignal::Leave(_) => None,
                    })
                    .collect();
                self.dispatch_room_signals(signals).await;
                for conversation_id in rejoined {
                    self.sync_latest(&conversation_id);
                }
            }
            ChannelSignal::Frame(ServerFrame::Message(payload)) => self.apply_inbound(payload),
            ChannelSignal::Frame(ServerFrame::Error(err)) => {
                warn!(code = ?err.code, "server reported error: {}", err.message);
                self.publish(SyncEvent::Server(err));
            }
        }
    }

    fn apply_inbound(&mut self, payload: Message) {
        let conversation_id = payload.conversation_id.clone();
        let tracked = self.rooms.active() == Some(&conversation_id)
            || self.stores.store(&conversation_id).is_some();
        if !tracked {
            debug!(
                conversation_id = %conversation_id,
                message_id = %payload.id,
                "ignoring message for unopened conversation"
            );
            return;
        }

        let disposition = reconcile::apply_inbound(self.stores.store_mut(&conversation_id), payload);
        let mutation = match disposition {
            InboundDisposition::Reconciled => StoreMutation::Reconciled,
            InboundDisposition::Appended => StoreMutation::Appended,
            InboundDisposition::Duplicate => return,
        };
        self.publish(SyncEvent::StoreChanged {
            conversation_id,
            mutation,
        });
    }

    async fn dispatch_room_signals(&mut self, signals: Vec<RoomSignal>) {
        for signal in signals {
            let frame = signal.clone().into_frame();
            match self.transport.emit(frame).await {
                Ok(()) => {
                    info!(?signal, "room membership updated");
                    self.publish(SyncEvent::Room(signal));
                }
                Err(err) => {
                    warn!(?signal, "failed to dispatch room signal: {err:#}");
                    self.publish(SyncEvent::Error(format!(
                        "failed to dispatch {signal:?}: {err}"
                    )));
                }
            }
        }
    }

    async fn teardown(&mut self) {
        let signals = self.rooms.teardown();
        self.dispatch_room_signals(signals).await;
    }

    fn publish(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
