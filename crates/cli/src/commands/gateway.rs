//! `depo gateway`: Start the HTTP API server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }

    println!("Deposition assistant gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Strategy:  {}", config.agent.strategy);
    println!("   Sessions:  {} ({})", config.session.backend, config.session.db_path);

    depo_gateway::start(config).await
}
