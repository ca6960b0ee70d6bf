//! `council new`: Create a conversation.

use council_config::AppConfig;
use council_core::CouncilBackend;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::backend(config)?;
    let summary = backend.create_conversation().await?;
    println!("{}", summary.id);
    Ok(())
}
