//! `council list`: List conversations, newest first.

use council_config::AppConfig;
use council_core::CouncilBackend;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::backend(config)?;
    let mut conversations = backend.list_conversations().await?;

    if conversations.is_empty() {
        println!("No conversations yet. Start one with `council ask \"...\"`.");
        return Ok(());
    }

    conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    for line in crate::render::conversation_rows(&conversations) {
        println!("{line}");
    }
    Ok(())
}
