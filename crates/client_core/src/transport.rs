use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::protocol::{ClientFrame, ServerFrame};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::TransportError, ChannelTransport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Disconnected,
    Frame(ServerFrame),
}

/// Delay between reconnect attempts, doubling from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl ReconnectBackoff {
    fn next(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max)
    }
}

pub struct WsConnection {
    writer: Arc<Mutex<Option<WsWriter>>>,
    channel_task: JoinHandle<()>,
}

impl WsConnection {
    pub async fn connect(
        realtime_url: &str,
        buffer: usize,
    ) -> std::result::Result<(Arc<Self>, mpsc::Receiver<ChannelSignal>), TransportError> {
        Self::connect_with_backoff(realtime_url, buffer, ReconnectBackoff::default()).await
    }

    pub async fn connect_with_backoff(
        realtime_url: &str,
        buffer: usize,
        backoff: ReconnectBackoff,
    ) -> std::result::Result<(Arc<Self>, mpsc::Receiver<ChannelSignal>), TransportError> {
        let url = Url::parse(realtime_url)
            .map_err(|_| TransportError::InvalidUrl(realtime_url.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(realtime_url.to_string()));
        }

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(format!("{url}: {err}")))?;
        let (sink, reader) = stream.split();
        let writer = Arc::new(Mutex::new(Some(sink)));

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let _ = tx.send(ChannelSignal::Connected).await;
        info!(url = %url, "realtime channel connected");

        let channel_task = tokio::spawn(run_channel(
            url,
            reader,
            Arc::clone(&writer),
            tx,
            backoff,
        ));

        Ok((
            Arc::new(Self {
                writer,
                channel_task,
            }),
            rx,
        ))
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Closes the socket for good; no reconnect follows.
    pub async fn close(&self) {
        self.channel_task.abort();
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
    }
}

async fn run_channel(
    url: Url,
    mut reader: WsReader,
    writer: Arc<Mutex<Option<WsWriter>>>,
    tx: mpsc::Sender<ChannelSignal>,
    backoff: ReconnectBackoff,
) {
    loop {
        let engine_running = forward_frames(&mut reader, &tx).await;
        writer.lock().await.take();
        if !engine_running || tx.send(ChannelSignal::Disconnected).await.is_err() {
            debug!("sync engine stopped; closing realtime channel");
            return;
        }
        info!("realtime channel disconnected");

        let Some(stream) = reconnect(&url, backoff, &tx).await else {
            return;
        };
        let (sink, next_reader) = stream.split();
        *writer.lock().await = Some(sink);
        reader = next_reader;
        if tx.send(ChannelSignal::Connected).await.is_err() {
            writer.lock().await.take();
            return;
        }
        info!(url = %url, "realtime channel reconnected");
    }
}

// Returns false once the engine side of the signal channel is gone.
async fn forward_frames(reader: &mut WsReader, tx: &mpsc::Sender<ChannelSignal>) -> bool {
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(frame) => {
                    if tx.send(ChannelSignal::Frame(frame)).await.is_err() {
                        return false;
                    }
                }
                Err(err) => warn!("ignoring invalid server frame: {err}"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("realtime receive failed: {err}");
                break;
            }
        }
    }
    true
}

async fn reconnect(
    url: &Url,
    backoff: ReconnectBackoff,
    tx: &mpsc::Sender<ChannelSignal>,
) -> Option<WsStream> {
    let mut delay = backoff.initial;
    loop {
        sleep(delay).await;
        if tx.is_closed() {
            return None;
        }
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => return Some(stream),
            Err(err) => {
                delay = backoff.next(delay);
                warn!(
                    url = %url,
                    retry_in_ms = delay.as_millis() as u64,
                    "realtime reconnect failed: {err}"
                );
            }
        }
    }
}

#[async_trait]
impl ChannelTransport for WsConnection {
    async fn emit(&self, frame: ClientFrame) -> Result<()> {
        let name = frame.name();
        let text = serde_json::to_string(&frame)
            .map_err(|source| TransportError::Encode { frame: name, source })?;
        let mut guard = self.writer.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(WsMessage::Text(text))
            .await
            .map_err(|err| TransportError::Send {
                frame: name,
                reason: err.to_string(),
            })?;
        debug!(frame = name, "realtime frame sent");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
