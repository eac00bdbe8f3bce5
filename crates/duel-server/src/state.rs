use sqlx::SqlitePool;

use crate::engine::DuelEngine;

/// Shared application state.
pub struct AppState {
    /// Backs both the user directory and the snapshot store.
    pub db: SqlitePool,
    pub engine: DuelEngine,
}
