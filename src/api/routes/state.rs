use std::sync::Arc;

use crate::lifecycle::AlertManager;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AlertManager>,
}

impl AppState {
    pub fn new(manager: Arc<AlertManager>) -> Self {
        Self { manager }
    }
}
