//! Session persistence for the deposition assistant.
//!
//! Two [`SessionStore`] backends: SQLite for real deployments and an
//! in-memory map for tests and throwaway runs.

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

use depo_config::SessionConfig;
use depo_core::error::{Error, Result};
use depo_core::session::SessionStore;
use std::sync::Arc;

/// Build the store selected by `[session] backend`.
pub async fn from_config(config: &SessionConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemorySessionStore::new())),
        "sqlite" => Ok(Arc::new(SqliteSessionStore::new(&config.db_path).await?)),
        other => Err(Error::config(format!(
            "unknown session backend '{other}', expected 'sqlite' or 'memory'"
        ))),
    }
}
