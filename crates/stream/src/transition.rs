//! Stage transition table.
//!
//! | Event           | Effect on the last assistant message                               |
//! |-----------------|--------------------------------------------------------------------|
//! | stage1_start    | loading.stage1 = true, streaming.stage1 = {}                       |
//! | stage1_complete | stage1 = data, loading 1→false 2→true, streaming.stage1 = {}       |
//! | stage2_start    | loading.stage2 = true, streaming.stage2 = {}                       |
//! | stage2_complete | stage2 = data, metadata, loading 2→false 3→true, streaming.stage2 = {} |
//! | stage3_start    | loading.stage3 = true, streaming.stage3 = ""                       |
//! | stage3_complete | stage3 = data, loading.stage3 = false, streaming.stage3 = ""       |
//! | title_complete  | none (conversation list refresh)                                   |
//! | complete        | any stage still loading is settled                                 |
//! | error           | none here; the aggregator rolls back or settles                    |
//!
//! A completion whose stage is not loading is still applied, with a warning.

use council_core::message::AssistantMessage;
use council_core::Transition;
use tracing::warn;

/// What applying a transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The message changed.
    Updated,
    /// The message is untouched; the conversation list should be refreshed.
    RefreshList,
    /// The run finished successfully.
    Completed,
    /// The run failed with this message.
    Failed(String),
}

/// Apply one transition to the last assistant message.
pub fn apply(mut msg: AssistantMessage, transition: Transition) -> (AssistantMessage, Effect) {
    let effect = match transition {
        Transition::Stage1Start => {
            msg.loading.stage1 = true;
            msg.streaming.stage1.clear();
            Effect::Updated
        }
        Transition::Stage1Complete(data) => {
            check_loading(msg.loading.stage1, "stage1_complete");
            msg.stage1 = Some(data);
            msg.loading.stage1 = false;
            msg.loading.stage2 = true;
            msg.streaming.stage1.clear();
            Effect::Updated
        }
        Transition::Stage2Start => {
            msg.loading.stage2 = true;
            msg.streaming.stage2.clear();
            Effect::Updated
        }
        Transition::Stage2Complete { data, metadata } => {
            check_loading(msg.loading.stage2, "stage2_complete");
            msg.stage2 = Some(data);
            msg.metadata = Some(metadata);
            msg.loading.stage2 = false;
            msg.loading.stage3 = true;
            msg.streaming.stage2.clear();
            Effect::Updated
        }
        Transition::Stage3Start => {
            msg.loading.stage3 = true;
            msg.streaming.stage3.clear();
            Effect::Updated
        }
        Transition::Stage3Complete(data) => {
            check_loading(msg.loading.stage3, "stage3_complete");
            msg.stage3 = Some(data);
            msg.loading.stage3 = false;
            msg.streaming.stage3.clear();
            Effect::Updated
        }
        Transition::TitleComplete => Effect::RefreshList,
        Transition::Complete => {
            if msg.is_in_flight() || !msg.streaming.is_empty() {
                warn!(loading = ?msg.loading, "Run completed with a stage still loading");
                msg.settle();
            }
            Effect::Completed
        }
        Transition::Error { message } => Effect::Failed(message),
    };
    (msg, effect)
}

fn check_loading(loading: bool, kind: &str) {
    if !loading {
        warn!(kind, "Completion arrived for a stage that was not loading");
    }
}
