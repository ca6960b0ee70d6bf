//! HTTP backend for the council server REST API.
//!
//! Endpoints:
//! - `GET  /api/conversations`
//! - `POST /api/conversations`
//! - `GET  /api/conversations/{id}`
//! - `POST /api/conversations/{id}/message/stream` (SSE)

use std::time::Duration;

use async_trait::async_trait;
use council_core::{
    BackendError, Conversation, ConversationId, ConversationSummary, CouncilBackend,
    EventReceiver, PipelineEvent, StreamError,
};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::SseDecoder;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

/// A [`CouncilBackend`] speaking HTTP and Server-Sent Events.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    event_buffer: usize,
}

impl HttpBackend {
    /// Create a backend for the server at `base_url` (e.g. `http://localhost:8001`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_options(base_url, DEFAULT_TIMEOUT, DEFAULT_EVENT_BUFFER)
    }

    /// `request_timeout` bounds the REST calls and connection setup; an open
    /// event stream is not subject to it.
    pub fn with_options(
        base_url: impl Into<String>,
        request_timeout: Duration,
        event_buffer: usize,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            request_timeout,
            event_buffer: event_buffer.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<T, BackendError> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CouncilBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        let url = self.url("conversations");
        debug!(%url, "Listing conversations");
        self.read_json(self.client.get(&url), "conversations").await
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, BackendError> {
        let url = self.url(&format!("conversations/{id}"));
        debug!(%url, "Fetching conversation");
        self.read_json(self.client.get(&url), id.as_str()).await
    }

    async fn create_conversation(&self) -> Result<ConversationSummary, BackendError> {
        let url = self.url("conversations");
        debug!(%url, "Creating conversation");
        let request = self.client.post(&url).json(&serde_json::json!({}));
        self.read_json(request, "conversations").await
    }

    async fn send_message_stream(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<EventReceiver, BackendError> {
        let url = self.url(&format!("conversations/{conversation_id}/message/stream"));
        debug!(%url, "Opening event stream");

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&SendMessageRequest { content })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response, conversation_id.as_str()).await?;

        let (tx, rx) = mpsc::channel(self.event_buffer);
        tokio::spawn(pump_events(response, tx));
        Ok(rx)
    }
}

/// Read the SSE body and forward one item per `data:` payload.
///
/// Ends when the body ends, the byte stream fails, or the receiver is dropped.
async fn pump_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<PipelineEvent, StreamError>>,
) {
    let mut byte_stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Event stream interrupted");
                let _ = tx.send(Err(StreamError::Interrupted(e.to_string()))).await;
                return;
            }
        };

        for payload in decoder.feed(&bytes) {
            if !forward(&tx, &payload).await {
                debug!("Event receiver dropped, closing stream");
                return;
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        forward(&tx, &payload).await;
    }
}

async fn forward(tx: &mpsc::Sender<Result<PipelineEvent, StreamError>>, payload: &str) -> bool {
    let item = PipelineEvent::decode(payload);
    match &item {
        Ok(event) => trace!(kind = event.kind(), "Received event"),
        Err(e) => debug!(error = %e, "Undecodable event"),
    }
    tx.send(item).await.is_ok()
}

async fn check_status(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(resource.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "Council server error");
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:8001/").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8001");
        assert_eq!(
            backend.url("conversations/abc/message/stream"),
            "http://localhost:8001/api/conversations/abc/message/stream"
        );
    }

    #[test]
    fn zero_event_buffer_is_clamped() {
        let backend =
            HttpBackend::with_options("http://localhost:8001", DEFAULT_TIMEOUT, 0).unwrap();
        assert_eq!(backend.event_buffer, 1);
    }

    #[test]
    fn send_request_body_shape() {
        let body = serde_json::to_value(SendMessageRequest { content: "hello" }).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "hello" }));
    }
}
