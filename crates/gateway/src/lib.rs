//! HTTP API for the deposition assistant.
//!
//! Exposes chat, document upload, feedback, health and strategy listing.
//! Built on Axum; every request is logged through `tower-http`'s
//! `TraceLayer`.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use depo_agent::{Assembly, TurnOrchestrator};
use depo_core::session::SessionStore;
use depo_core::strategy::StrategyKind;
use depo_core::trace::TraceSink;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Uploaded depositions can be large; everything else is small JSON.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub trace: Arc<dyn TraceSink>,
    pub strategy: StrategyKind,
    pub uploads_dir: PathBuf,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn from_assembly(assembly: &Assembly) -> Self {
        Self {
            orchestrator: assembly.orchestrator.clone(),
            sessions: assembly.sessions.clone(),
            trace: assembly.telemetry.clone(),
            strategy: assembly.strategy,
            uploads_dir: PathBuf::from(&assembly.config.gateway.uploads_dir),
        }
    }
}

/// CORS for the configured front-end origins. Unparseable origins are
/// skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the router with all routes and layers.
pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(api::health_handler))
        .route("/frameworks", get(api::frameworks_handler))
        .route("/chat", post(api::chat_handler))
        .route("/upload", post(api::upload_handler))
        .route("/feedback", post(api::feedback_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Assemble the agent stack from `config` and serve until Ctrl-C.
pub async fn start(config: depo_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let cors_origins = config.gateway.cors_origins.clone();

    let assembly = depo_agent::assemble(config).await?;
    let state = Arc::new(GatewayState::from_assembly(&assembly));
    tokio::fs::create_dir_all(&state.uploads_dir).await?;

    let app = build_router(state.clone(), &cors_origins);

    info!(
        addr = %addr,
        strategy = %state.strategy,
        uploads_dir = %state.uploads_dir.display(),
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
