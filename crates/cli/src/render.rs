//! Terminal rendering of conversations and run progress.

use council_config::DisplayConfig;
use council_core::render::{
    aggregate_lines, short_model_name, stage1_entries, stage2_entries, stage3_view,
};
use council_core::{AssistantMessage, Conversation, ConversationSummary, Message};
use council_stream::Snapshot;

/// One line per conversation: id, creation time, title, message count.
pub fn conversation_rows(conversations: &[ConversationSummary]) -> Vec<String> {
    conversations
        .iter()
        .map(|c| {
            format!(
                "{:<38} {}  {:<32} {:>3} msgs",
                c.id.as_str(),
                c.created_at.format("%Y-%m-%d %H:%M"),
                c.title.as_deref().unwrap_or("New Conversation"),
                c.message_count
            )
        })
        .collect()
}

/// Render every message of a conversation.
pub fn conversation(conv: &Conversation, display: &DisplayConfig) -> String {
    let mut out = format!(
        "# {}\n\n",
        conv.title.as_deref().unwrap_or("New Conversation")
    );
    if conv.messages.is_empty() {
        out.push_str("(no messages)\n");
    }
    for message in &conv.messages {
        match message {
            Message::User { content } => {
                out.push_str(&format!("You: {content}\n\n"));
            }
            Message::Assistant(msg) => {
                out.push_str(&assistant(msg, display));
                out.push('\n');
            }
        }
    }
    out
}

/// Render one assistant message, stage by stage.
pub fn assistant(msg: &AssistantMessage, display: &DisplayConfig) -> String {
    let mut out = String::new();

    if display.show_stage_details {
        let stage1 = stage1_entries(msg);
        if !stage1.is_empty() {
            out.push_str("── Stage 1: Individual Responses ──\n");
            for entry in stage1 {
                out.push_str(&format!(
                    "[{}]{}\n{}\n\n",
                    short_model_name(&entry.model),
                    if entry.streaming { " …" } else { "" },
                    entry.text
                ));
            }
        }

        let stage2 = stage2_entries(msg, display.deanonymize);
        if !stage2.is_empty() {
            out.push_str("── Stage 2: Peer Rankings ──\n");
            for entry in stage2 {
                out.push_str(&format!(
                    "[{}]{}\n{}\n",
                    short_model_name(&entry.model),
                    if entry.streaming { " …" } else { "" },
                    entry.text
                ));
                if !entry.parsed_ranking.is_empty() {
                    out.push_str("Extracted ranking:\n");
                    for (i, model) in entry.parsed_ranking.iter().enumerate() {
                        out.push_str(&format!("  {}. {model}\n", i + 1));
                    }
                }
                out.push('\n');
            }
        }

        if let Some(metadata) = &msg.metadata
            && !metadata.aggregate_rankings.is_empty()
        {
            out.push_str("Aggregate rankings:\n");
            for line in aggregate_lines(&metadata.aggregate_rankings) {
                out.push_str(&format!("  {line}\n"));
            }
            out.push('\n');
        }
    }

    if let Some(view) = stage3_view(msg) {
        out.push_str("── Stage 3: Final Council Answer ──\n");
        if let Some(chairman) = &view.chairman {
            out.push_str(&format!("Chairman: {}\n", short_model_name(chairman)));
        }
        out.push_str(&view.text);
        out.push('\n');
    }

    if let Some(error) = &msg.error {
        out.push_str(&format!("Run failed: {error}\n"));
    }
    out
}

/// A one-line summary of the stage in progress, or `None` when idle.
pub fn progress_line(snapshot: &Snapshot) -> Option<String> {
    if !snapshot.is_loading {
        return None;
    }
    let msg = snapshot.conversation.as_ref()?.last_assistant()?;

    if msg.loading.stage1 {
        let streaming = msg.streaming.stage1.len();
        Some(if streaming == 0 {
            "Stage 1: collecting individual responses...".to_string()
        } else {
            format!("Stage 1: {streaming} model(s) responding...")
        })
    } else if msg.loading.stage2 {
        Some("Stage 2: peer rankings...".to_string())
    } else if msg.loading.stage3 {
        Some("Stage 3: final synthesis...".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use council_core::{
        AggregateRanking, ConversationId, RankingMetadata, Stage1Response, Stage2Ranking,
        Stage3Result,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn finished() -> AssistantMessage {
        AssistantMessage {
            stage1: Some(vec![Stage1Response {
                model: "openai/gpt-5".into(),
                response: "Paris.".into(),
            }]),
            stage2: Some(vec![Stage2Ranking {
                model: "anthropic/claude".into(),
                ranking: "Response A is correct.\nFINAL RANKING:\n1. Response A".into(),
                parsed_ranking: vec!["Response A".into()],
            }]),
            stage3: Some(Stage3Result {
                model: "google/gemini".into(),
                response: "The capital of France is Paris.".into(),
            }),
            metadata: Some(RankingMetadata {
                label_to_model: BTreeMap::from([(
                    "Response A".to_string(),
                    "openai/gpt-5".to_string(),
                )]),
                aggregate_rankings: vec![AggregateRanking {
                    model: "openai/gpt-5".into(),
                    average_rank: 1.0,
                    rankings_count: 1,
                }],
            }),
            ..AssistantMessage::default()
        }
    }

    #[test]
    fn assistant_renders_every_stage() {
        let out = assistant(&finished(), &DisplayConfig::default());
        assert!(out.contains("[gpt-5]\nParis."));
        assert!(out.contains("**gpt-5** is correct."));
        assert!(out.contains("  1. gpt-5"));
        assert!(out.contains("Aggregate rankings:"));
        assert!(out.contains("Chairman: gemini"));
        assert!(out.ends_with("The capital of France is Paris.\n"));
    }

    #[test]
    fn labels_kept_when_deanonymize_is_off() {
        let display = DisplayConfig {
            deanonymize: false,
            ..DisplayConfig::default()
        };
        let out = assistant(&finished(), &display);
        assert!(out.contains("Response A is correct."));
    }

    #[test]
    fn hidden_stage_details_show_only_the_answer() {
        let display = DisplayConfig {
            show_stage_details: false,
            ..DisplayConfig::default()
        };
        let out = assistant(&finished(), &display);
        assert!(!out.contains("Stage 1"));
        assert!(!out.contains("Stage 2"));
        assert!(out.contains("Stage 3"));
    }

    #[test]
    fn streaming_answer_is_balanced() {
        let mut msg = AssistantMessage::placeholder();
        msg.loading.stage1 = false;
        msg.loading.stage3 = true;
        msg.streaming.stage3 = "Use `cargo".into();
        let out = assistant(&msg, &DisplayConfig::default());
        assert!(out.contains("Use `cargo`"));
    }

    #[test]
    fn failed_run_shows_its_error() {
        let msg = AssistantMessage {
            error: Some("ranking failed".into()),
            ..finished()
        };
        let out = assistant(&msg, &DisplayConfig::default());
        assert!(out.contains("Run failed: ranking failed"));
    }

    #[test]
    fn conversation_renders_user_turns() {
        let mut conv = Conversation::new(
            ConversationId::from("c-1"),
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        );
        conv.title = Some("Capitals".into());
        conv.messages.push(Message::user("Capital of France?"));
        conv.messages.push(Message::Assistant(finished()));

        let out = conversation(&conv, &DisplayConfig::default());
        assert!(out.starts_with("# Capitals\n"));
        assert!(out.contains("You: Capital of France?"));
        assert!(out.contains("The capital of France is Paris."));
    }

    #[test]
    fn rows_show_title_and_count() {
        let rows = conversation_rows(&[ConversationSummary {
            id: ConversationId::from("c-1"),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            title: None,
            message_count: 4,
        }]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("c-1"));
        assert!(rows[0].contains("2025-03-01 10:00"));
        assert!(rows[0].contains("New Conversation"));
        assert!(rows[0].ends_with("  4 msgs"));
    }

    #[test]
    fn progress_follows_the_loading_stage() {
        let mut conv = Conversation::new(ConversationId::from("c-1"), Utc::now());
        conv.messages.push(Message::user("q"));
        let mut msg = AssistantMessage::placeholder();
        conv.messages.push(Message::Assistant(msg.clone()));
        let snapshot = |conv: &Conversation, is_loading| Snapshot {
            revision: 1,
            conversation: Some(Arc::new(conv.clone())),
            is_loading,
        };

        assert_eq!(
            progress_line(&snapshot(&conv, true)).as_deref(),
            Some("Stage 1: collecting individual responses...")
        );

        msg.loading.stage1 = false;
        msg.loading.stage2 = true;
        conv.messages[1] = Message::Assistant(msg);
        assert_eq!(
            progress_line(&snapshot(&conv, true)).as_deref(),
            Some("Stage 2: peer rankings...")
        );
        assert_eq!(progress_line(&snapshot(&conv, false)), None);
    }
}
