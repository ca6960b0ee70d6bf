//! Message and Conversation domain types.
//!
//! A conversation alternates user messages and assistant messages. An
//! assistant message carries the three council stages: the finalized payload
//! of each stage, the loading flags of the stage currently streaming, and the
//! partial text accumulated for it so far.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a conversation, assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One model's answer in stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Response {
    pub model: String,
    pub response: String,
}

/// One model's evaluation of the anonymized stage 1 answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Ranking {
    pub model: String,

    /// Raw evaluation text, still using anonymous labels ("Response A").
    pub ranking: String,

    /// Labels in ranked order, as extracted by the server.
    #[serde(default)]
    pub parsed_ranking: Vec<String>,
}

/// The chairman's synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Result {
    pub model: String,
    pub response: String,
}

/// Combined ranking of one model across all peer evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRanking {
    pub model: String,

    /// Mean position (1 = best).
    pub average_rank: f64,

    pub rankings_count: u32,
}

/// Data attached to an assistant message when stage 2 completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingMetadata {
    /// Anonymous label → model identifier.
    #[serde(default, alias = "labelToModel")]
    pub label_to_model: BTreeMap<String, String>,

    #[serde(default, alias = "aggregateRankings")]
    pub aggregate_rankings: Vec<AggregateRanking>,
}

/// Which stages are actively streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    pub stage1: bool,
    pub stage2: bool,
    pub stage3: bool,
}

impl LoadingState {
    pub fn any(&self) -> bool {
        self.stage1 || self.stage2 || self.stage3
    }
}

/// Partial text accumulated for the stage(s) currently streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingState {
    /// Model identifier → partial response.
    #[serde(default)]
    pub stage1: BTreeMap<String, String>,

    /// Model identifier → partial evaluation.
    #[serde(default)]
    pub stage2: BTreeMap<String, String>,

    /// Partial chairman text.
    #[serde(default)]
    pub stage3: String,
}

impl StreamingState {
    pub fn is_empty(&self) -> bool {
        self.stage1.is_empty() && self.stage2.is_empty() && self.stage3.is_empty()
    }
}

/// An assistant turn: the council's answer, filled in stage by stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub stage1: Option<Vec<Stage1Response>>,

    #[serde(default)]
    pub stage2: Option<Vec<Stage2Ranking>>,

    #[serde(default)]
    pub stage3: Option<Stage3Result>,

    #[serde(default)]
    pub metadata: Option<RankingMetadata>,

    #[serde(default)]
    pub loading: LoadingState,

    #[serde(default)]
    pub streaming: StreamingState,

    /// Set when the run producing this message failed after partial progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistantMessage {
    /// The placeholder appended when a send starts: stage 1 loading, nothing streamed.
    pub fn placeholder() -> Self {
        Self {
            loading: LoadingState {
                stage1: true,
                stage2: false,
                stage3: false,
            },
            ..Self::default()
        }
    }

    /// Whether any stage has produced finalized content.
    pub fn has_finalized_stage(&self) -> bool {
        self.stage1.is_some() || self.stage2.is_some() || self.stage3.is_some()
    }

    /// Whether a stage of this message is still streaming.
    pub fn is_in_flight(&self) -> bool {
        self.loading.any()
    }

    /// Clear every loading flag and all partial text.
    pub fn settle(&mut self) {
        self.loading = LoadingState::default();
        self.streaming = StreamingState::default();
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User { content: String },
    Assistant(AssistantMessage),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            Self::User { .. } => None,
        }
    }

    pub fn as_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            Self::User { .. } => None,
        }
    }
}

/// A conversation is an ordered sequence of messages; insertion order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,

    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new(id: ConversationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            title: None,
            messages: Vec::new(),
        }
    }

    /// The last message, if it is an assistant message.
    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.messages.last().and_then(Message::as_assistant)
    }

    pub fn last_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        self.messages.last_mut().and_then(Message::as_assistant_mut)
    }

    /// Number of assistant messages with a stage still streaming.
    pub fn in_flight_count(&self) -> usize {
        self.messages
            .iter()
            .filter_map(Message::as_assistant)
            .filter(|m| m.is_in_flight())
            .count()
    }
}

/// Timestamps arrive either as RFC 3339 or as naive ISO 8601 (assumed UTC).
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}
