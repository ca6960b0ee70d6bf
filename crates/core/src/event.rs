//! Pipeline events streamed by the council server.
//!
//! Every event is a JSON object tagged by `"type"`:
//! - `stage1_start` / `stage1_token` / `stage1_complete`
//! - `stage2_start` / `stage2_token` / `stage2_complete`
//! - `stage3_start` / `stage3_token` / `stage3_complete`
//! - `title_complete` : the conversation title changed
//! - `complete`       : the run finished successfully
//! - `error`          : the run failed
//!
//! The driver splits events into token deltas (buffered and coalesced) and
//! discrete transitions (applied immediately) via [`PipelineEvent::into_dispatch`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StreamError;
use crate::message::{RankingMetadata, Stage1Response, Stage2Ranking, Stage3Result};

/// Identifier of one pipeline run, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events emitted by the server during one council run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Stage1Start,

    Stage1Token { model: String, content: String },

    Stage1Complete { data: Vec<Stage1Response> },

    Stage2Start,

    Stage2Token { model: String, content: String },

    Stage2Complete {
        data: Vec<Stage2Ranking>,
        #[serde(default)]
        metadata: RankingMetadata,
    },

    Stage3Start,

    Stage3Token { content: String },

    Stage3Complete { data: Stage3Result },

    TitleComplete,

    Complete,

    Error { message: String },
}

/// Wire names of every event kind, in pipeline order.
pub const EVENT_KINDS: [&str; 12] = [
    "stage1_start",
    "stage1_token",
    "stage1_complete",
    "stage2_start",
    "stage2_token",
    "stage2_complete",
    "stage3_start",
    "stage3_token",
    "stage3_complete",
    "title_complete",
    "complete",
    "error",
];

impl PipelineEvent {
    /// Wire name for this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage1Start => "stage1_start",
            Self::Stage1Token { .. } => "stage1_token",
            Self::Stage1Complete { .. } => "stage1_complete",
            Self::Stage2Start => "stage2_start",
            Self::Stage2Token { .. } => "stage2_token",
            Self::Stage2Complete { .. } => "stage2_complete",
            Self::Stage3Start => "stage3_start",
            Self::Stage3Token { .. } => "stage3_token",
            Self::Stage3Complete { .. } => "stage3_complete",
            Self::TitleComplete => "title_complete",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Decode one JSON event object.
    ///
    /// An unrecognized `"type"` yields [`StreamError::UnknownEvent`]; a known
    /// type with a bad payload yields [`StreamError::Malformed`].
    pub fn decode(json: &str) -> Result<Self, StreamError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| StreamError::Malformed {
                kind: "<unparsed>".into(),
                reason: e.to_string(),
            })?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| StreamError::Malformed {
                kind: "<untyped>".into(),
                reason: "missing string field `type`".into(),
            })?
            .to_string();

        if !EVENT_KINDS.contains(&kind.as_str()) {
            return Err(StreamError::UnknownEvent(kind));
        }

        serde_json::from_value(value).map_err(|e| StreamError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }

    /// Split into a buffered token delta or a discrete transition.
    pub fn into_dispatch(self) -> Dispatch {
        match self {
            Self::Stage1Token { model, content } => {
                Dispatch::Token(TokenDelta::Stage1 { model, content })
            }
            Self::Stage2Token { model, content } => {
                Dispatch::Token(TokenDelta::Stage2 { model, content })
            }
            Self::Stage3Token { content } => Dispatch::Token(TokenDelta::Stage3 { content }),
            Self::Stage1Start => Dispatch::Transition(Transition::Stage1Start),
            Self::Stage1Complete { data } => Dispatch::Transition(Transition::Stage1Complete(data)),
            Self::Stage2Start => Dispatch::Transition(Transition::Stage2Start),
            Self::Stage2Complete { data, metadata } => {
                Dispatch::Transition(Transition::Stage2Complete { data, metadata })
            }
            Self::Stage3Start => Dispatch::Transition(Transition::Stage3Start),
            Self::Stage3Complete { data } => Dispatch::Transition(Transition::Stage3Complete(data)),
            Self::TitleComplete => Dispatch::Transition(Transition::TitleComplete),
            Self::Complete => Dispatch::Transition(Transition::Complete),
            Self::Error { message } => Dispatch::Transition(Transition::Error { message }),
        }
    }
}

/// How the driver routes an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Token(TokenDelta),
    Transition(Transition),
}

/// A partial-content fragment for one stage.
///
/// Stage 1 and 2 fragments are keyed by model; stage 3 has a single author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDelta {
    Stage1 { model: String, content: String },
    Stage2 { model: String, content: String },
    Stage3 { content: String },
}

impl TokenDelta {
    pub fn content(&self) -> &str {
        match self {
            Self::Stage1 { content, .. } | Self::Stage2 { content, .. } | Self::Stage3 { content } => {
                content
            }
        }
    }
}

/// A discrete (non-token) event, applied to the last message of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Stage1Start,
    Stage1Complete(Vec<Stage1Response>),
    Stage2Start,
    Stage2Complete {
        data: Vec<Stage2Ranking>,
        metadata: RankingMetadata,
    },
    Stage3Start,
    Stage3Complete(Stage3Result),
    TitleComplete,
    Complete,
    Error { message: String },
}

impl Transition {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage1Start => "stage1_start",
            Self::Stage1Complete(_) => "stage1_complete",
            Self::Stage2Start => "stage2_start",
            Self::Stage2Complete { .. } => "stage2_complete",
            Self::Stage3Start => "stage3_start",
            Self::Stage3Complete(_) => "stage3_complete",
            Self::TitleComplete => "title_complete",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_token_event() {
        let event =
            PipelineEvent::decode(r#"{"type":"stage1_token","model":"A","content":"Hi"}"#).unwrap();
        assert_eq!(
            event,
            PipelineEvent::Stage1Token {
                model: "A".into(),
                content: "Hi".into()
            }
        );
        assert_eq!(event.kind(), "stage1_token");
    }

    #[test]
    fn decode_stage2_complete_with_metadata() {
        let json = r#"{
            "type": "stage2_complete",
            "data": [{"model": "org/modelB", "ranking": "Response A is best", "parsed_ranking": ["Response A"]}],
            "metadata": {
                "label_to_model": {"Response A": "org/modelA"},
                "aggregate_rankings": [{"model": "org/modelA", "average_rank": 1.0, "rankings_count": 1}]
            }
        }"#;
        match PipelineEvent::decode(json).unwrap() {
            PipelineEvent::Stage2Complete { data, metadata } => {
                assert_eq!(data[0].parsed_ranking, vec!["Response A".to_string()]);
                assert_eq!(metadata.label_to_model["Response A"], "org/modelA");
                assert_eq!(metadata.aggregate_rankings.len(), 1);
            }
            other => panic!("Expected Stage2Complete, got {other:?}"),
        }
    }

    #[test]
    fn decode_unit_event_ignores_extra_fields() {
        let event =
            PipelineEvent::decode(r#"{"type":"title_complete","data":{"title":"Hi"}}"#).unwrap();
        assert_eq!(event, PipelineEvent::TitleComplete);
    }

    #[test]
    fn decode_unknown_kind() {
        let err = PipelineEvent::decode(r#"{"type":"stage4_start"}"#).unwrap_err();
        assert_eq!(err, StreamError::UnknownEvent("stage4_start".into()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn decode_malformed_payload() {
        let err = PipelineEvent::decode(r#"{"type":"stage3_token"}"#).unwrap_err();
        match err {
            StreamError::Malformed { kind, .. } => assert_eq!(kind, "stage3_token"),
            other => panic!("Expected Malformed, got {other:?}"),
        }
        assert!(PipelineEvent::decode("not json").is_err());
        assert!(PipelineEvent::decode(r#"{"content":"x"}"#).is_err());
    }

    #[test]
    fn every_kind_serializes_to_its_wire_name() {
        let events = vec![
            PipelineEvent::Stage1Start,
            PipelineEvent::Stage2Start,
            PipelineEvent::Stage3Start,
            PipelineEvent::Stage3Token {
                content: "x".into(),
            },
            PipelineEvent::TitleComplete,
            PipelineEvent::Complete,
            PipelineEvent::Error {
                message: "boom".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            assert!(json.contains(&format!(r#""type":"{}""#, event.kind())));
            assert!(EVENT_KINDS.contains(&event.kind()));
        }
    }

    #[test]
    fn tokens_dispatch_to_deltas() {
        let dispatch = PipelineEvent::Stage3Token {
            content: "abc".into(),
        }
        .into_dispatch();
        match dispatch {
            Dispatch::Token(delta) => assert_eq!(
                delta,
                TokenDelta::Stage3 {
                    content: "abc".into()
                }
            ),
            Dispatch::Transition(t) => panic!("Expected token, got {t:?}"),
        }
    }

    #[test]
    fn discrete_events_dispatch_to_transitions() {
        let dispatch = PipelineEvent::Error {
            message: "timeout".into(),
        }
        .into_dispatch();
        assert_eq!(
            dispatch,
            Dispatch::Transition(Transition::Error {
                message: "timeout".into()
            })
        );
    }
}
