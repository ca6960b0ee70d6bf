//! Pipeline driver: runs one council pipeline per `send`.
//!
//! The driver owns the aggregator and a frame clock. It awaits either the next
//! stream event or, while a flush is pending, the next frame. Frames win when
//! both are ready so a token burst cannot starve flushes.

use std::sync::Arc;
use std::time::Duration;

use council_core::{
    BackendError, Conversation, ConversationId, ConversationSummary, CouncilBackend, Dispatch,
    EventReceiver, PipelineError, PipelineEvent, RunId, StreamError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{ConversationAggregator, RunOutcome, Snapshot, TransitionResult};
use crate::scheduler::FrameClock;

const STREAM_ENDED_EARLY: &str = "stream ended before completion";

/// The conversation list, refreshed from the backend.
///
/// Failed refreshes are logged and leave the previous list in place.
#[derive(Clone)]
pub struct ConversationIndex {
    backend: Arc<dyn CouncilBackend>,
    list: Arc<watch::Sender<Vec<ConversationSummary>>>,
}

impl ConversationIndex {
    pub fn new(backend: Arc<dyn CouncilBackend>) -> Self {
        let (list, _) = watch::channel(Vec::new());
        Self {
            backend,
            list: Arc::new(list),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.list.subscribe()
    }

    pub fn current(&self) -> Vec<ConversationSummary> {
        self.list.borrow().clone()
    }

    /// Fetch the list and publish it.
    pub async fn refresh(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        let list = self.backend.list_conversations().await?;
        debug!(count = list.len(), "Conversation list refreshed");
        self.list.send_replace(list.clone());
        Ok(list)
    }

    /// Refresh in the background, logging failures.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.refresh().await {
                warn!(error = %e, "Conversation list refresh failed");
            }
        })
    }
}

/// Drives pipeline runs for the loaded conversation.
pub struct PipelineDriver<C: FrameClock> {
    backend: Arc<dyn CouncilBackend>,
    aggregator: ConversationAggregator,
    clock: C,
    index: ConversationIndex,
    idle_timeout: Option<Duration>,
}

enum Next {
    Item(Result<PipelineEvent, StreamError>),
    Closed,
    Idle(Duration),
}

impl<C: FrameClock> PipelineDriver<C> {
    pub fn new(backend: Arc<dyn CouncilBackend>, clock: C) -> Self {
        let index = ConversationIndex::new(backend.clone());
        Self {
            backend,
            aggregator: ConversationAggregator::new(),
            clock,
            index,
            idle_timeout: None,
        }
    }

    /// Fail a run when the stream stays silent this long.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.aggregator.subscribe()
    }

    pub fn conversations(&self) -> &ConversationIndex {
        &self.index
    }

    pub fn aggregator(&self) -> &ConversationAggregator {
        &self.aggregator
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.aggregator.conversation()
    }

    /// Create a conversation on the server and load it.
    pub async fn create_conversation(&mut self) -> council_core::Result<ConversationSummary> {
        let summary = self.backend.create_conversation().await?;
        self.aggregator.load(summary.to_conversation())?;
        info!(conversation_id = %summary.id, "Created conversation");

        if let Err(e) = self.index.refresh().await {
            warn!(error = %e, "Conversation list refresh failed");
        }
        Ok(summary)
    }

    /// Load a conversation from the server. State is untouched on failure.
    pub async fn open_conversation(&mut self, id: &ConversationId) -> council_core::Result<()> {
        let conversation = self.backend.get_conversation(id).await?;
        debug!(
            conversation_id = %id,
            messages = conversation.messages.len(),
            "Loaded conversation"
        );
        self.aggregator.load(conversation)?;
        Ok(())
    }

    /// Settle a run whose `send` future was dropped before it finished.
    pub fn abandon_run(&mut self) -> bool {
        self.aggregator.abandon_run()
    }

    /// Send `content` to the loaded conversation and drive the run to its end.
    ///
    /// Caller errors (no conversation, wrong conversation, a run already
    /// active) are returned as `Err`. A run that fails, including one whose
    /// stream cannot be opened, returns `Ok(RunOutcome::Failed { .. })`.
    pub async fn send(
        &mut self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> council_core::Result<RunOutcome> {
        match self.aggregator.conversation() {
            None => return Err(PipelineError::NoConversation.into()),
            Some(conv) if conv.id != *conversation_id => {
                return Err(PipelineError::ConversationMismatch {
                    loaded: conv.id.to_string(),
                    requested: conversation_id.to_string(),
                }
                .into());
            }
            Some(_) => {}
        }
        self.aggregator.append_optimistic_pair(content)?;

        let run_id = RunId::new();
        info!(
            run_id = %run_id,
            conversation_id = %conversation_id,
            backend = self.backend.name(),
            "Starting council run"
        );

        let events = match self
            .backend
            .send_message_stream(conversation_id, content)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to open event stream");
                return Ok(self.aggregator.fail_run(e.to_string()));
            }
        };

        let outcome = self.run(&run_id, events).await;

        match &outcome {
            RunOutcome::Completed => {
                info!(run_id = %run_id, "Council run completed");
                if let Err(e) = self.index.refresh().await {
                    warn!(error = %e, "Conversation list refresh failed");
                }
            }
            RunOutcome::Failed {
                message,
                rolled_back,
            } => {
                warn!(
                    run_id = %run_id,
                    error = %message,
                    rolled_back,
                    "Council run failed"
                );
            }
        }
        Ok(outcome)
    }

    async fn run(&mut self, run_id: &RunId, mut events: EventReceiver) -> RunOutcome {
        let idle_timeout = self.idle_timeout;
        loop {
            tokio::select! {
                biased;

                _ = self.clock.next_frame(), if self.aggregator.is_flush_pending() => {
                    self.aggregator.on_frame();
                }

                next = next_event(&mut events, idle_timeout) => match next {
                    Next::Item(Ok(event)) => {
                        if let Some(outcome) = self.dispatch(run_id, event) {
                            return outcome;
                        }
                    }
                    Next::Item(Err(e)) if !e.is_fatal() => {
                        warn!(run_id = %run_id, error = %e, "Ignoring stream event");
                    }
                    Next::Item(Err(e)) => return self.aggregator.fail_run(e.to_string()),
                    Next::Closed => return self.aggregator.fail_run(STREAM_ENDED_EARLY),
                    Next::Idle(limit) => {
                        let err = StreamError::IdleTimeout(limit.as_secs());
                        return self.aggregator.fail_run(err.to_string());
                    }
                },
            }
        }
    }

    fn dispatch(&mut self, run_id: &RunId, event: PipelineEvent) -> Option<RunOutcome> {
        match event.into_dispatch() {
            Dispatch::Token(delta) => {
                self.aggregator.buffer_token(delta);
                None
            }
            Dispatch::Transition(transition) => {
                let kind = transition.kind();
                match self.aggregator.apply_transition(transition) {
                    TransitionResult::Applied => None,
                    TransitionResult::Ignored => {
                        debug!(run_id = %run_id, kind, "Transition ignored");
                        None
                    }
                    TransitionResult::RefreshList => {
                        self.index.spawn_refresh();
                        None
                    }
                    TransitionResult::Finished(outcome) => Some(outcome),
                }
            }
        }
    }
}

async fn next_event(events: &mut EventReceiver, idle_timeout: Option<Duration>) -> Next {
    let received = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
            Ok(received) => received,
            Err(_) => return Next::Idle(limit),
        },
        None => events.recv().await,
    };
    match received {
        Some(item) => Next::Item(item),
        None => Next::Closed,
    }
}
