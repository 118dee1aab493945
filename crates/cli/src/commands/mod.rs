pub mod chat;
pub mod config_cmd;
pub mod gateway;

use depo_config::AppConfig;
use depo_core::strategy::StrategyKind;
use std::path::Path;

/// Load config from `path` (or the default location) with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let loaded = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    loaded.map_err(|e| format!("Failed to load config: {e}").into())
}

/// `depo frameworks`: list strategies, marking the configured one.
pub fn frameworks(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let active = config.strategy()?;
    for kind in StrategyKind::ALL {
        let marker = if kind == active { "*" } else { " " };
        println!("{marker} {kind}");
    }
    Ok(())
}
