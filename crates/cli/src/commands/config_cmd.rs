//! `depo config`: Configuration management commands.

use depo_config::AppConfig;
use std::path::Path;

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e);
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if let Err(e) = config.check_credentials() {
        warnings.push(e.to_string());
    }
    if config.web_search.api_key.is_none() {
        warnings.push("No web search key set (TAVILY_API_KEY); search_web will report itself unavailable".into());
    }
    if config.tracing.api_url.is_none() {
        warnings.push("No trace backend set (DEPO_TRACE_URL); spans stay in process memory".into());
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Model:     {}", config.default_model);
    println!("   Strategy:  {}", config.agent.strategy);
    println!("   Rounds:    {}", config.agent.max_rounds);
    println!("   Sessions:  {}", config.session.backend);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);

    Ok(())
}

/// Print the effective configuration with secrets removed.
pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    redact(&mut config);
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn redact(config: &mut AppConfig) {
    let hide = |secret: &mut Option<String>| {
        if secret.is_some() {
            *secret = Some("[REDACTED]".into());
        }
    };
    hide(&mut config.api_key);
    hide(&mut config.web_search.api_key);
    hide(&mut config.tracing.api_key);
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
