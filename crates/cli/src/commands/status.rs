//! `council status`: Show configuration and server reachability.

use std::path::Path;

use council_config::AppConfig;
use council_core::CouncilBackend;

pub async fn run(config: &AppConfig, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Council Status");
    println!("==============");
    println!("  Config file:     {}", config_path.display());
    println!("  Server:          {}", config.server.base_url);
    println!("  Request timeout: {}s", config.server.request_timeout_secs);
    println!("  Idle timeout:    {}s", config.server.stream_idle_timeout_secs);
    println!("  Frame interval:  {}ms", config.stream.frame_interval_ms);
    println!("  Stage details:   {}", if config.display.show_stage_details { "shown" } else { "hidden" });
    println!("  Model names:     {}", if config.display.deanonymize { "de-anonymized" } else { "labels" });

    if !config_path.exists() {
        println!("\n  No config file, using defaults. Run `council init` to create one.");
    }

    let backend = super::backend(config)?;
    match backend.health_check().await {
        Ok(_) => println!("\n  Server reachable"),
        Err(e) => println!("\n  Server unreachable: {e}"),
    }
    Ok(())
}
