//! `council init`: Write the default configuration file.

use std::path::Path;

use council_config::AppConfig;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run `council init`.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("Created config at: {}", config_path.display());
    println!("Point `server.base_url` at your council server, then run `council status`.");
    Ok(())
}
