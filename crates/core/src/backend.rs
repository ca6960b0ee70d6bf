//! Backend trait: the abstraction over the council server.
//!
//! A backend knows how to list, load and create conversations, and how to
//! open the event stream for one user message. The pipeline driver consumes
//! the stream without knowing which transport produced it.
//!
//! Implementations: HTTP/SSE (`council-client`), scripted in-memory backends in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{BackendError, StreamError};
use crate::event::PipelineEvent;
use crate::message::{Conversation, ConversationId};

/// Events of one run, in arrival order. Channel close is the completion signal.
pub type EventReceiver = mpsc::Receiver<Result<PipelineEvent, StreamError>>;

/// A row of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,

    #[serde(with = "crate::message::timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub message_count: usize,
}

impl ConversationSummary {
    /// An empty conversation with this summary's identity.
    pub fn to_conversation(&self) -> Conversation {
        let mut conv = Conversation::new(self.id.clone(), self.created_at);
        conv.title = self.title.clone();
        conv
    }
}

/// The core backend trait.
#[async_trait]
pub trait CouncilBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "http").
    fn name(&self) -> &str;

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError>;

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, BackendError>;

    async fn create_conversation(&self) -> Result<ConversationSummary, BackendError>;

    /// Submit `content` to a conversation and stream the run's events.
    ///
    /// Each received item corresponds to one server event. Failing to open
    /// the stream at all is reported as a `BackendError`.
    async fn send_message_stream(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<EventReceiver, BackendError>;

    /// Can we reach the server?
    async fn health_check(&self) -> Result<bool, BackendError> {
        self.list_conversations().await.map(|_| true)
    }
}
