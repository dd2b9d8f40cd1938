//! Application state shared across handlers

use std::sync::Arc;
use std::time::Instant;

use ledgerd_core::Database;

use crate::metrics::HttpMetrics;

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub metrics: HttpMetrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            metrics: HttpMetrics::default(),
            start_time: Instant::now(),
        })
    }
}
