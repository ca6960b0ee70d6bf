//! Conversation aggregator: the sole writer of the conversation snapshot.
//!
//! Token deltas are buffered and folded at most once per frame. Discrete
//! transitions cancel the pending frame and fold whatever is buffered first,
//! so every token of a stage is visible before that stage's completion.
//! Each state change is published as a [`Snapshot`] on a `watch` channel.

use std::sync::Arc;

use council_core::message::{AssistantMessage, Conversation, Message, StreamingState};
use council_core::{PipelineError, TokenDelta, Transition};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::buffer::TokenBuffer;
use crate::scheduler::{FrameScheduler, SchedulerStats};
use crate::transition::{self as table, Effect};

/// A published view of the conversation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Increases by one per published change.
    pub revision: u64,
    pub conversation: Option<Arc<Conversation>>,
    /// Whether a pipeline run is active.
    pub is_loading: bool,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed {
        message: String,
        /// Whether the optimistic user/assistant pair was removed.
        rolled_back: bool,
    },
}

/// Result of [`ConversationAggregator::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Applied,
    /// No message to apply to; nothing changed.
    Ignored,
    /// The conversation list should be refreshed.
    RefreshList,
    Finished(RunOutcome),
}

pub struct ConversationAggregator {
    conversation: Option<Conversation>,
    buffer: TokenBuffer,
    scheduler: FrameScheduler,
    /// Index of the user message appended by the active run.
    pending_pair: Option<usize>,
    is_loading: bool,
    revision: u64,
    snapshots: watch::Sender<Snapshot>,
}

impl ConversationAggregator {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            conversation: None,
            buffer: TokenBuffer::new(),
            scheduler: FrameScheduler::new(),
            pending_pair: None,
            is_loading: false,
            revision: 0,
            snapshots,
        }
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_flush_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Replace the current conversation. Rejected while a run is active.
    pub fn load(&mut self, conversation: Conversation) -> Result<(), PipelineError> {
        if self.is_loading {
            return Err(PipelineError::RunActive(self.conversation_label()));
        }
        self.discard_buffered();
        self.conversation = Some(conversation);
        self.publish();
        Ok(())
    }

    /// Append the user message and a stage-1-loading placeholder as one update.
    pub fn append_optimistic_pair(&mut self, user_text: &str) -> Result<(), PipelineError> {
        if self.is_loading {
            return Err(PipelineError::RunActive(self.conversation_label()));
        }
        let conv = self
            .conversation
            .as_mut()
            .ok_or(PipelineError::NoConversation)?;

        for msg in conv.messages.iter_mut().filter_map(Message::as_assistant_mut) {
            if msg.is_in_flight() {
                warn!("Settling an assistant message left in flight by an earlier run");
                msg.settle();
            }
        }

        let index = conv.messages.len();
        conv.messages.push(Message::user(user_text));
        conv.messages
            .push(Message::Assistant(AssistantMessage::placeholder()));

        self.discard_buffered();
        self.pending_pair = Some(index);
        self.is_loading = true;
        self.publish();
        Ok(())
    }

    /// Buffer a token fragment and request a frame.
    ///
    /// Returns whether this call armed a new frame.
    pub fn buffer_token(&mut self, delta: TokenDelta) -> bool {
        if delta.content().is_empty() {
            return false;
        }
        self.buffer.append(delta);
        self.scheduler.schedule()
    }

    /// A rendering opportunity arrived: flush if one is pending.
    pub fn on_frame(&mut self) -> bool {
        if !self.scheduler.fire() {
            return false;
        }
        self.flush()
    }

    /// Drain the buffer into the snapshot. Publishes only when something changed.
    pub fn flush(&mut self) -> bool {
        match self.buffer.drain() {
            Some(buffered) => self.fold_flush(buffered),
            None => false,
        }
    }

    /// Merge buffered deltas into the last message's streaming text.
    ///
    /// An empty batch is a no-op and never clears streamed content.
    pub fn fold_flush(&mut self, buffered: StreamingState) -> bool {
        if buffered.is_empty() {
            return false;
        }
        let changed = self.fold(buffered);
        if changed {
            self.publish();
        }
        changed
    }

    /// Fold pending tokens, then apply one discrete transition.
    pub fn apply_transition(&mut self, transition: Transition) -> TransitionResult {
        let kind = transition.kind();
        self.scheduler.cancel_pending();
        let folded = match self.buffer.drain() {
            Some(buffered) => self.fold(buffered),
            None => false,
        };

        let Some(slot) = self
            .conversation
            .as_mut()
            .and_then(Conversation::last_assistant_mut)
        else {
            warn!(kind, "No assistant message to apply transition to");
            return match transition {
                Transition::Complete => {
                    self.end_run();
                    self.publish();
                    TransitionResult::Finished(RunOutcome::Completed)
                }
                Transition::Error { message } => TransitionResult::Finished(self.fail_run(message)),
                Transition::TitleComplete => TransitionResult::RefreshList,
                _ => TransitionResult::Ignored,
            };
        };

        let (msg, effect) = table::apply(std::mem::take(slot), transition);
        *slot = msg;
        debug!(kind, "Applied transition");

        match effect {
            Effect::Updated => {
                self.publish();
                TransitionResult::Applied
            }
            Effect::RefreshList => {
                if folded {
                    self.publish();
                }
                TransitionResult::RefreshList
            }
            Effect::Completed => {
                self.end_run();
                self.publish();
                TransitionResult::Finished(RunOutcome::Completed)
            }
            Effect::Failed(message) => TransitionResult::Finished(self.fail_run(message)),
        }
    }

    /// End the active run as failed.
    ///
    /// Rolls back the optimistic pair when no stage has finalized content;
    /// otherwise settles the assistant message and records the error on it.
    pub fn fail_run(&mut self, message: impl Into<String>) -> RunOutcome {
        let message = message.into();
        self.discard_buffered();

        let ours = self.pending_pair.is_some();
        let rolled_back = match self.check_pair() {
            Ok(index) => {
                if let Some(conv) = self.conversation.as_mut() {
                    conv.messages.truncate(index);
                }
                true
            }
            Err(reason) => {
                debug!(%reason, "Keeping partial progress");
                if let Some(msg) = self
                    .conversation
                    .as_mut()
                    .and_then(Conversation::last_assistant_mut)
                    .filter(|m| ours || m.is_in_flight())
                {
                    msg.settle();
                    msg.error = Some(message.clone());
                }
                false
            }
        };

        self.end_run();
        self.publish();
        RunOutcome::Failed {
            message,
            rolled_back,
        }
    }

    /// Remove exactly the pair appended by the active run.
    ///
    /// Refused once any stage has finalized content, or when the pair is no
    /// longer the last two messages.
    pub fn rollback_last_pair(&mut self) -> Result<(), PipelineError> {
        let index = self.check_pair()?;
        self.discard_buffered();
        if let Some(conv) = self.conversation.as_mut() {
            conv.messages.truncate(index);
        }
        self.end_run();
        self.publish();
        Ok(())
    }

    /// Abandon an active run without a terminal event (e.g. the caller went away).
    pub fn abandon_run(&mut self) -> bool {
        if !self.is_loading {
            return false;
        }
        self.discard_buffered();
        if let Some(msg) = self
            .conversation
            .as_mut()
            .and_then(Conversation::last_assistant_mut)
        {
            msg.settle();
        }
        self.end_run();
        self.publish();
        true
    }

    fn check_pair(&self) -> Result<usize, PipelineError> {
        let index = self
            .pending_pair
            .ok_or_else(|| PipelineError::RollbackRefused("no optimistic pair pending".into()))?;
        let conv = self
            .conversation
            .as_ref()
            .ok_or(PipelineError::NoConversation)?;

        if conv.messages.len() != index + 2 {
            return Err(PipelineError::RollbackRefused(
                "optimistic pair is no longer the last two messages".into(),
            ));
        }
        match (&conv.messages[index], &conv.messages[index + 1]) {
            (Message::User { .. }, Message::Assistant(msg)) if !msg.has_finalized_stage() => {
                Ok(index)
            }
            (Message::User { .. }, Message::Assistant(_)) => Err(PipelineError::RollbackRefused(
                "a stage already produced finalized content".into(),
            )),
            _ => Err(PipelineError::RollbackRefused(
                "last two messages are not a user/assistant pair".into(),
            )),
        }
    }

    fn fold(&mut self, buffered: StreamingState) -> bool {
        let Some(msg) = self
            .conversation
            .as_mut()
            .and_then(Conversation::last_assistant_mut)
        else {
            warn!("Dropping buffered tokens: no assistant message");
            return false;
        };

        let mut changed = false;
        if !buffered.stage1.is_empty() {
            if msg.loading.stage1 {
                for (model, text) in buffered.stage1 {
                    msg.streaming.stage1.entry(model).or_default().push_str(&text);
                }
                changed = true;
            } else {
                warn!(stage = "stage1", "Dropping tokens for a stage that is not loading");
            }
        }
        if !buffered.stage2.is_empty() {
            if msg.loading.stage2 {
                for (model, text) in buffered.stage2 {
                    msg.streaming.stage2.entry(model).or_default().push_str(&text);
                }
                changed = true;
            } else {
                warn!(stage = "stage2", "Dropping tokens for a stage that is not loading");
            }
        }
        if !buffered.stage3.is_empty() {
            if msg.loading.stage3 {
                msg.streaming.stage3.push_str(&buffered.stage3);
                changed = true;
            } else {
                warn!(stage = "stage3", "Dropping tokens for a stage that is not loading");
            }
        }
        changed
    }

    /// Cancel the pending frame and drop buffered tokens.
    fn discard_buffered(&mut self) {
        self.scheduler.cancel_pending();
        let fragments = self.buffer.fragments();
        if self.buffer.drain().is_some() {
            debug!(fragments, "Discarded buffered tokens");
        }
    }

    fn end_run(&mut self) {
        self.is_loading = false;
        self.pending_pair = None;
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = Snapshot {
            revision: self.revision,
            conversation: self.conversation.clone().map(Arc::new),
            is_loading: self.is_loading,
        };
        self.snapshots.send_replace(snapshot);
        trace!(revision = self.revision, "Published snapshot");
    }

    fn conversation_label(&self) -> String {
        self.conversation
            .as_ref()
            .map(|c| c.id.to_string())
            .unwrap_or_else(|| "<none>".into())
    }
}

impl Default for ConversationAggregator {
    fn default() -> Self {
        Self::new()
    }
}
