//! `council ask`: Ask the council and stream the run.
//!
//! Progress is reported on stderr as stages advance; the final answer is
//! rendered on stdout once the run ends.

use std::sync::Arc;

use council_config::AppConfig;
use council_core::ConversationId;
use council_stream::{IntervalClock, PipelineDriver, RunOutcome};
use tracing::info;

pub async fn run(
    config: &AppConfig,
    conversation: Option<String>,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(super::backend(config)?);
    let clock = IntervalClock::new(config.stream.frame_interval());
    let mut driver = PipelineDriver::new(backend, clock)
        .with_idle_timeout(config.server.stream_idle_timeout());

    let id = match conversation {
        Some(id) => {
            let id = ConversationId(id);
            driver.open_conversation(&id).await?;
            id
        }
        None => {
            let summary = driver.create_conversation().await?;
            info!(conversation_id = %summary.id, "Started a new conversation");
            summary.id
        }
    };

    let mut snapshots = driver.subscribe();
    let progress = tokio::spawn(async move {
        let mut last = None;
        while snapshots.changed().await.is_ok() {
            let line = crate::render::progress_line(&snapshots.borrow_and_update());
            if let Some(text) = line.filter(|l| last.as_ref() != Some(l)) {
                eprintln!("{text}");
                last = Some(text);
            }
        }
    });

    let outcome = driver.send(&id, message).await?;
    progress.abort();

    let keep_answer = !matches!(outcome, RunOutcome::Failed { rolled_back: true, .. });
    if keep_answer && let Some(answer) = driver.conversation().and_then(|c| c.last_assistant()) {
        print!("{}", crate::render::assistant(answer, &config.display));
    }

    match outcome {
        RunOutcome::Completed => {
            println!("\nconversation: {id}");
            Ok(())
        }
        RunOutcome::Failed { message, .. } => Err(format!("Council run failed: {message}").into()),
    }
}
