use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Conversation, ConversationId},
    error::ApiError,
    protocol::{ConversationsPage, MessagesPage, PageQuery},
};
use tracing::debug;
use url::Url;

use crate::{settings::ClientSettings, HistoryApi};

pub struct HttpHistoryApi {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpHistoryApi {
    pub fn new(
        api_url: &str,
        request_timeout: Duration,
        access_token: Option<String>,
    ) -> Result<Self> {
        let base_url =
            Url::parse(api_url).with_context(|| format!("invalid api url: {api_url}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("api url cannot be used as a base: {api_url}"));
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(
            &settings.api_url,
            settings.request_timeout,
            settings.access_token.clone(),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = serde_json::from_str::<ApiError>(&body)
            .unwrap_or_else(|_| ApiError::from_status(status.as_u16(), format!("{status} {body}")));
        return Err(err.into());
    }
    response
        .json()
        .await
        .context("failed to decode response body")
}

#[async_trait]
impl HistoryApi for HttpHistoryApi {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        query: &PageQuery,
    ) -> Result<MessagesPage> {
        let url = self.endpoint(&["chats", conversation_id.as_str(), "messages"]);
        debug!(
            conversation_id = %conversation_id,
            limit = query.limit,
            before = ?query.before_cursor,
            "fetching message page"
        );
        let response = self
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("message history request failed for {conversation_id}"))?;
        read_json(response).await
    }

    async fn list_conversations(&self, query: &PageQuery) -> Result<ConversationsPage> {
        let url = self.endpoint(&["chats"]);
        let response = self
            .get(url)
            .query(query)
            .send()
            .await
            .context("conversation list request failed")?;
        read_json(response).await
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        let url = self.endpoint(&["chats", conversation_id.as_str()]);
        let response = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("conversation request failed for {conversation_id}"))?;
        read_json(response).await
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
