//! # Council Core
//!
//! Domain types, traits, and error definitions for the Council client.
//! A council run answers one user message in three stages: independent
//! model responses, anonymized peer ranking, and a chairman synthesis.
//!
//! This crate defines the conversation model, the closed set of pipeline
//! events a server streams back, and the `CouncilBackend` trait that
//! transports implement. The streaming aggregator lives in `council-stream`.

pub mod backend;
pub mod error;
pub mod event;
pub mod message;
pub mod render;

// Re-export key types at crate root for ergonomics
pub use backend::{ConversationSummary, CouncilBackend, EventReceiver};
pub use error::{BackendError, Error, PipelineError, Result, StreamError};
pub use event::{Dispatch, PipelineEvent, RunId, TokenDelta, Transition};
pub use message::{
    AggregateRanking, AssistantMessage, Conversation, ConversationId, LoadingState, Message,
    RankingMetadata, Stage1Response, Stage2Ranking, Stage3Result, StreamingState,
};
