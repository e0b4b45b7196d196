//! Shared application state

use crate::relay::{RequestCoordinator, Session};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RequestCoordinator,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            coordinator: RequestCoordinator::new(session),
            started_at: Utc::now(),
        }
    }
}
