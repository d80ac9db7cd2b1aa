//! REST client for chat history
//!
//! Implements [`ChatHistoryRepository`] against the dashboard API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::application::dto::{
    ApiAck, ChatHistoryResponse, ConversationsResponse, HistoryQuery, UnreadCountResponse,
};
use crate::config::ApiSettings;
use crate::domain::{ChatHistoryRepository, ConversationSummary, HistoryPage, SessionProvider};
use crate::infrastructure::metrics;
use crate::shared::error::HistoryError;

/// History API client authenticated with the current session's bearer token
#[derive(Clone)]
pub struct HistoryClient {
    client: Client,
    base_url: Url,
    sessions: Arc<dyn SessionProvider>,
}

impl HistoryClient {
    pub fn new(settings: &ApiSettings, sessions: Arc<dyn SessionProvider>) -> Result<Self, HistoryError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        let base_url = Url::parse(settings.base_url.trim_end_matches('/'))
            .map_err(|e| HistoryError::InvalidUrl(format!("{}: {}", settings.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(HistoryError::InvalidUrl(settings.base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            sessions,
        })
    }

    /// Append `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.sessions.current_session() {
            Some(session) if !session.token.is_empty() => request.bearer_auth(session.token),
            _ => request,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, HistoryError> {
        let started = Instant::now();
        let result = match self.authorized(request).send().await {
            Ok(response) => decode(response, fallback).await,
            Err(e) => Err(HistoryError::from(e)),
        };

        metrics::record_history_request(operation, result.is_ok(), started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, "History API request failed");
        }
        result
    }
}

/// Map a response to its body or to a [`HistoryError`].
async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T, HistoryError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(HistoryError::from);
    }

    let message = response
        .json::<ApiAck>()
        .await
        .ok()
        .and_then(|ack| ack.reason().map(str::to_owned))
        .unwrap_or_else(|| fallback.to_string());

    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        return Err(HistoryError::Unauthorized(message));
    }

    Err(HistoryError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChatHistoryRepository for HistoryClient {
    async fn fetch_history(
        &self,
        peer_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let query = HistoryQuery { page, limit };
        let request = self
            .client
            .get(self.url(&["chat", "history", peer_id]))
            .query(&query);

        let response: ChatHistoryResponse = self
            .execute("fetch_history", request, "Failed to get chat history")
            .await?;

        tracing::debug!(
            peer_id = %peer_id,
            page,
            count = response.messages.len(),
            "Fetched chat history"
        );
        Ok(response.into())
    }

    async fn fetch_conversation_summaries(&self) -> Result<Vec<ConversationSummary>, HistoryError> {
        let request = self.client.get(self.url(&["chat", "conversations"]));
        let response: ConversationsResponse = self
            .execute("fetch_conversations", request, "Failed to get conversations")
            .await?;

        Ok(response
            .conversations
            .into_iter()
            .map(ConversationSummary::from)
            .collect())
    }

    async fn mark_read(&self, peer_id: &str) -> Result<(), HistoryError> {
        let request = self
            .client
            .put(self.url(&["chat", "mark-read", peer_id]));
        let _: ApiAck = self
            .execute("mark_read", request, "Failed to mark messages as read")
            .await?;
        Ok(())
    }

    async fn unread_count(&self) -> Result<u32, HistoryError> {
        let request = self.client.get(self.url(&["chat", "unread-count"]));
        let response: UnreadCountResponse = self
            .execute("unread_count", request, "Failed to get unread count")
            .await?;
        Ok(response.unread_count)
    }
}
