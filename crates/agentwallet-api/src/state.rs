//! Application state shared across handlers

use agentwallet_engine::Engine;
use agentwallet_store::Store;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            store: engine.store.clone(),
            engine,
        }
    }
}
