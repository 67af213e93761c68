use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings_from, settings::DEFAULT_SETTINGS_FILE, EngineConfig, EngineHandle, HistoryApi,
    HttpHistoryApi, SyncEngine, SyncEvent, WsConnection,
};
use shared::{
    domain::{ConversationId, UserId},
    protocol::PageQuery,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    realtime_url: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    access_token: Option<String>,
    /// Conversation to open on startup.
    #[arg(long)]
    conversation: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config);
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    if let Some(realtime_url) = args.realtime_url {
        settings.realtime_url = Some(realtime_url);
    }
    if let Some(user_id) = args.user_id {
        settings.user_id = Some(UserId(user_id));
    }
    if let Some(token) = args.access_token {
        settings.access_token = Some(token);
    }

    let history = Arc::new(HttpHistoryApi::from_settings(&settings)?);
    let realtime_url = settings.realtime_url()?;
    let (connection, inbound) =
        WsConnection::connect_with_backoff(&realtime_url, settings.event_buffer, settings.reconnect)
            .await
            .context("failed to open realtime channel")?;
    let engine = SyncEngine::spawn(
        EngineConfig::from(&settings),
        connection.clone(),
        history.clone(),
        inbound,
    );
    info!(api_url = %settings.api_url, realtime_url = %realtime_url, "chat client started");

    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::StoreChanged { .. }) => {}
                Ok(SyncEvent::Room(signal)) => info!(?signal, "room"),
                Ok(SyncEvent::ConnectionChanged { connected }) => info!(connected, "connection"),
                Ok(SyncEvent::Server(err)) => warn!("server error: {err}"),
                Ok(SyncEvent::Error(err)) => error!("{err}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut active = args.conversation.map(ConversationId);
    if active.is_some() {
        engine.select_conversation(active.clone()).await?;
    }

    println!(
        "commands: /chats, /open <id>, /close, /older, /show, /status, /quit; anything else is sent"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/chats", _) => list_conversations(history.as_ref(), &settings.user_id).await,
            ("/open", id) if !id.trim().is_empty() => {
                active = Some(ConversationId::from(id.trim()));
                engine
                    .select_conversation(active.clone())
                    .await
                    .map_err(Into::into)
            }
            ("/status", _) => {
                let state = if connection.is_connected().await {
                    "connected"
                } else {
                    "reconnecting"
                };
                println!("{state}");
                Ok(())
            }
            ("/close", _) => {
                active = None;
                engine.select_conversation(None).await.map_err(Into::into)
            }
            ("/older", _) => match &active {
                Some(id) => engine
                    .load_older(id.clone())
                    .await
                    .map(|outcome| println!("{outcome:?}"))
                    .map_err(Into::into),
                None => {
                    println!("no conversation open");
                    Ok(())
                }
            },
            ("/show", _) => match &active {
                Some(id) => show(&engine, id).await,
                None => {
                    println!("no conversation open");
                    Ok(())
                }
            },
            _ if line.is_empty() => Ok(()),
            _ => engine
                .send_message(line)
                .await
                .map(|_| ())
                .map_err(Into::into),
        };
        if let Err(err) = result {
            error!("{err:#}");
        }
    }

    engine.shutdown().await?;
    connection.close().await;
    Ok(())
}

async fn list_conversations(history: &dyn HistoryApi, me: &Option<UserId>) -> Result<()> {
    let page = history.list_conversations(&PageQuery::default()).await?;
    for conversation in page.data {
        println!(
            "{}\t{}",
            conversation.id,
            conversation.display_name(me.as_ref())
        );
    }
    Ok(())
}

async fn show(engine: &EngineHandle, conversation_id: &ConversationId) -> Result<()> {
    let view = engine.ordered_view(conversation_id.clone()).await?;
    for row in view.rows() {
        let marker = if row.pending { " (sending)" } else { "" };
        let author = if row.is_own {
            "me".to_string()
        } else {
            row.message.sender_id.to_string()
        };
        if row.first_in_sequence {
            println!("{author}:");
        }
        println!(
            "  [{}] {}{marker}",
            row.message.created_at.format("%H:%M"),
            row.message.content
        );
    }
    Ok(())
}
