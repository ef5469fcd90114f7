//! `careline config`: Configuration management commands.

use careline_config::AppConfig;
use std::path::Path;

pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn init(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = super::config_path(config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", super::config_path(config_path).display());
}
