// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod ranking;
pub mod resolver;
pub mod service;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::{EventError, RankingError};
pub use crate::ranking::RankingClient;
pub use crate::service::{EventService, NearbyRequest};

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::store::{EventStore, MemoryStore, SqliteStore};

/// Wire store and ranking client from configuration.
pub fn build_service(cfg: &AppConfig) -> anyhow::Result<EventService> {
    let store: Arc<dyn EventStore> = match &cfg.storage.database_path {
        Some(path) => Arc::new(
            SqliteStore::open(path)
                .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let ranking = RankingClient::from_url(cfg.ranking.url.as_deref(), cfg.ranking_timeout());
    info!(
        backend = store.backend(),
        ranking = ranking.engine_name(),
        timeout_ms = cfg.ranking.timeout_ms,
        "event service ready"
    );
    Ok(EventService::new(store, ranking))
}

/// Build the full API router from configuration (no `/metrics`; see [`metrics::Metrics`]).
pub fn app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let service = build_service(cfg)?;
    Ok(router(AppState { service }))
}
