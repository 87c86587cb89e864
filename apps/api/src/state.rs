use std::sync::Arc;

use crate::config::Config;
use crate::onboarding::store::ProfileStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// The store is a trait object so the Postgres backend can be swapped for the
/// in-memory one in tests without touching handler code.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub config: Config,
}
