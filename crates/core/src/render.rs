//! Display helpers shared by renderers.
//!
//! Turns an assistant message into per-stage views: the streaming text while
//! a stage is in progress, the finalized payload afterwards. Labels used during
//! anonymous peer ranking are mapped back to model names for display.

use std::collections::BTreeMap;

use crate::message::{AggregateRanking, AssistantMessage};

/// `"org/model"` → `"model"`; identifiers without a slash are returned whole.
pub fn short_model_name(model: &str) -> &str {
    match model.split_once('/') {
        Some((_, rest)) if !rest.is_empty() => rest.split('/').next().unwrap_or(rest),
        _ => model,
    }
}

/// Replace every anonymous label with the bold short name of its model.
pub fn deanonymize(text: &str, label_to_model: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    // Longest labels first so "Response AB" is not clobbered by "Response A".
    let mut labels: Vec<(&String, &String)> = label_to_model.iter().collect();
    labels.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    for (label, model) in labels {
        if label.is_empty() {
            continue;
        }
        result = result.replace(label.as_str(), &format!("**{}**", short_model_name(model)));
    }
    result
}

/// Close markdown constructs left open by a partial stream.
///
/// Handles an unclosed code fence, an odd inline backtick outside fences,
/// and an odd `**`.
pub fn balance_streaming_markdown(text: &str) -> String {
    let mut out = text.to_string();

    let fences = out.matches("```").count();
    if fences % 2 != 0 {
        out.push_str("\n```");
    }

    let backticks = text.matches('`').count();
    let inline = backticks.saturating_sub(fences * 3);
    if inline % 2 != 0 {
        out.push('`');
    }

    if out.matches("**").count() % 2 != 0 {
        out.push_str("**");
    }

    out
}

/// One tab of a multi-model stage view.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEntry {
    pub model: String,
    pub text: String,
    pub streaming: bool,
    /// Ranked model names (stage 2 only, finalized only).
    pub parsed_ranking: Vec<String>,
}

/// Stage 1 tabs: streaming partials while present, else the finalized responses.
pub fn stage1_entries(msg: &AssistantMessage) -> Vec<StageEntry> {
    if !msg.streaming.stage1.is_empty() {
        return streaming_entries(&msg.streaming.stage1);
    }
    msg.stage1
        .iter()
        .flatten()
        .map(|r| StageEntry {
            model: r.model.clone(),
            text: r.response.clone(),
            streaming: false,
            parsed_ranking: Vec::new(),
        })
        .collect()
}

/// Stage 2 tabs; finalized evaluations are de-anonymized when `deanonymize_labels` is set.
pub fn stage2_entries(msg: &AssistantMessage, deanonymize_labels: bool) -> Vec<StageEntry> {
    if !msg.streaming.stage2.is_empty() {
        return streaming_entries(&msg.streaming.stage2);
    }
    let labels = msg
        .metadata
        .as_ref()
        .map(|m| m.label_to_model.clone())
        .unwrap_or_default();

    msg.stage2
        .iter()
        .flatten()
        .map(|r| StageEntry {
            model: r.model.clone(),
            text: if deanonymize_labels {
                deanonymize(&r.ranking, &labels)
            } else {
                r.ranking.clone()
            },
            streaming: false,
            parsed_ranking: r
                .parsed_ranking
                .iter()
                .map(|label| match labels.get(label) {
                    Some(model) => short_model_name(model).to_string(),
                    None => label.clone(),
                })
                .collect(),
        })
        .collect()
}

/// The chairman view: streaming text while present, else the final response.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage3View {
    pub chairman: Option<String>,
    pub text: String,
    pub streaming: bool,
}

pub fn stage3_view(msg: &AssistantMessage) -> Option<Stage3View> {
    if !msg.streaming.stage3.is_empty() {
        return Some(Stage3View {
            chairman: msg.stage3.as_ref().map(|s| s.model.clone()),
            text: balance_streaming_markdown(&msg.streaming.stage3),
            streaming: true,
        });
    }
    msg.stage3.as_ref().map(|s| Stage3View {
        chairman: Some(s.model.clone()),
        text: s.response.clone(),
        streaming: false,
    })
}

/// `"#1 modelA  Avg: 1.50 (2 votes)"` lines, in server order.
pub fn aggregate_lines(rankings: &[AggregateRanking]) -> Vec<String> {
    rankings
        .iter()
        .enumerate()
        .map(|(i, agg)| {
            format!(
                "#{} {}  Avg: {:.2} ({} votes)",
                i + 1,
                short_model_name(&agg.model),
                agg.average_rank,
                agg.rankings_count
            )
        })
        .collect()
}

fn streaming_entries(partials: &BTreeMap<String, String>) -> Vec<StageEntry> {
    partials
        .iter()
        .map(|(model, text)| StageEntry {
            model: model.clone(),
            text: balance_streaming_markdown(text),
            streaming: true,
            parsed_ranking: Vec::new(),
        })
        .collect()
}
