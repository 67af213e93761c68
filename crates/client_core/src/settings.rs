use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Result};
use serde::Deserialize;
use shared::{
    domain::UserId,
    protocol::{clamp_page_limit, DEFAULT_PAGE_LIMIT},
};
use tracing::warn;

use crate::transport::ReconnectBackoff;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_url: String,
    /// Explicit realtime endpoint; derived from `api_url` when absent.
    pub realtime_url: Option<String>,
    pub user_id: Option<UserId>,
    pub access_token: Option<String>,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub event_buffer: usize,
    pub reconnect: ReconnectBackoff,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".into(),
            realtime_url: None,
            user_id: None,
            access_token: None,
            page_size: DEFAULT_PAGE_LIMIT,
            request_timeout: Duration::from_millis(10_000),
            event_buffer: 1024,
            reconnect: ReconnectBackoff::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    realtime_url: Option<String>,
    user_id: Option<String>,
    access_token: Option<String>,
    page_size: Option<u32>,
    request_timeout_ms: Option<u64>,
    event_buffer: Option<usize>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
}

impl ClientSettings {
    pub fn realtime_url(&self) -> Result<String> {
        if let Some(url) = &self.realtime_url {
            return Ok(url.clone());
        }
        let api_url = self.api_url.trim_end_matches('/');
        let ws_url = if let Some(rest) = api_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = api_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(anyhow!("api_url must start with http:// or https://"));
        };
        Ok(format!("{ws_url}/ws"))
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.api_url {
            self.api_url = v;
        }
        if let Some(v) = file.realtime_url {
            self.realtime_url = Some(v);
        }
        if let Some(v) = file.user_id {
            self.user_id = Some(UserId(v));
        }
        if let Some(v) = file.access_token {
            self.access_token = Some(v);
        }
        if let Some(v) = file.page_size {
            self.page_size = clamp_page_limit(v);
        }
        if let Some(v) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.event_buffer {
            self.event_buffer = v.max(1);
        }
        if let Some(v) = file.reconnect_initial_ms {
            self.reconnect.initial = Duration::from_millis(v.max(1));
        }
        if let Some(v) = file.reconnect_max_ms {
            self.reconnect.max = Duration::from_millis(v);
        }
        self.reconnect.max = self.reconnect.max.max(self.reconnect.initial);
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ["API_URL", "APP__API_URL"] {
            if let Some(v) = lookup(key) {
                self.api_url = v;
            }
        }
        for key in ["REALTIME_URL", "APP__REALTIME_URL"] {
            if let Some(v) = lookup(key) {
                self.realtime_url = Some(v);
            }
        }
        if let Some(v) = lookup("APP__USER_ID") {
            self.user_id = Some(UserId(v));
        }
        if let Some(v) = lookup("APP__ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = lookup("APP__PAGE_SIZE") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.page_size = clamp_page_limit(parsed);
            }
        }
        if let Some(v) = lookup("APP__REQUEST_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout = Duration::from_millis(parsed);
            }
        }
    }
}

/// Defaults, then the TOML file at `path` if it exists, then environment.
pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file) => settings.apply_file(file),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());
    settings
}
