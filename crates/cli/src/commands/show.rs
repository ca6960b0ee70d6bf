//! `council show`: Render a stored conversation.

use council_config::AppConfig;
use council_core::{ConversationId, CouncilBackend};

pub async fn run(config: &AppConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::backend(config)?;
    let conversation = backend.get_conversation(&ConversationId::from(id)).await?;
    print!("{}", crate::render::conversation(&conversation, &config.display));
    Ok(())
}
