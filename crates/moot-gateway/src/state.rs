use std::sync::Arc;

use moot_engine::RunEngine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub engine: Arc<RunEngine>,
}
