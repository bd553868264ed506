use finance::systems::System;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub system: Arc<dyn System>,
    /// Session ids handed out by `initialize`
    pub sessions: Arc<RwLock<HashSet<String>>>,
}

impl AppState {
    pub fn new(system: Arc<dyn System>) -> Self {
        Self {
            system,
            sessions: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}
