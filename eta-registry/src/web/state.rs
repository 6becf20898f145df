//! Application state for the web layer.

use std::sync::Arc;

use crate::registry::Registry;

/// Shared application state: the registry and nothing else.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}
