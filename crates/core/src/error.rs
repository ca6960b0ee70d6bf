//! Error types for the Council domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Council operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend (REST collaborator) errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Event stream errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Pipeline run errors ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the conversation REST collaborator (list/get/create/open stream).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// A single failed item on an event stream.
///
/// Unknown and malformed events are reported per item and do not end the run.
/// Interruptions and transport failures are fatal to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("Malformed {kind} event: {reason}")]
    Malformed { kind: String, reason: String },

    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    #[error("No stream activity for {0}s")]
    IdleTimeout(u64),
}

impl StreamError {
    /// Whether this error ends the pipeline run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownEvent(_) | Self::Malformed { .. } => false,
            Self::Interrupted(_) | Self::IdleTimeout(_) => true,
        }
    }
}

/// Caller errors against the pipeline driver and aggregator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("A pipeline run is already active for conversation {0}")]
    RunActive(String),

    #[error("No conversation is loaded")]
    NoConversation,

    #[error("Loaded conversation is {loaded}, not {requested}")]
    ConversationMismatch { loaded: String, requested: String },

    #[error("Rollback refused: {0}")]
    RollbackRefused(String),
}
