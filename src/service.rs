// src/service.rs
//! Retrieval orchestrator: composes the store, the reference resolver and the
//! ranking client into the operations exposed by the API.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EventError, Result};
use crate::geo;
use crate::ingest::IngestRequest;
use crate::metrics::ensure_metrics_described;
use crate::model::{Category, EventView, Page, PageRequest, RankedEvent};
use crate::ranking::{RankContext, RankingClient};
use crate::resolver;
use crate::store::EventStore;

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;
pub const DEFAULT_NEARBY_LIMIT: usize = 50;

/// Body of a nearby-events query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub preferred_category_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub query: Option<String>,
}

fn default_max_distance_km() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}
fn default_limit() -> usize {
    DEFAULT_NEARBY_LIMIT
}

impl NearbyRequest {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            limit: DEFAULT_NEARBY_LIMIT,
            preferred_category_ids: None,
            query: None,
        }
    }

    fn context(&self) -> Result<RankContext> {
        let latitude = self
            .latitude
            .ok_or_else(|| EventError::validation("latitude is required"))?;
        let longitude = self
            .longitude
            .ok_or_else(|| EventError::validation("longitude is required"))?;
        geo::validate_point(latitude, longitude)?;
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err(EventError::validation(format!(
                "maxDistanceKm must be a positive number, got {}",
                self.max_distance_km
            )));
        }
        if self.limit == 0 {
            return Err(EventError::validation("limit must be at least 1"));
        }
        Ok(RankContext {
            latitude,
            longitude,
            max_distance_km: self.max_distance_km,
            limit: self.limit,
        })
    }
}

/// One rejected ingestion item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of a batch: items are independent, so some may fail while others persist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub created: Vec<EventView>,
    pub failures: Vec<IngestFailure>,
}

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    ranking: RankingClient,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, ranking: RankingClient) -> Self {
        ensure_metrics_described();
        Self { store, ranking }
    }

    /// Validate, resolve and persist one item inside its own unit of work.
    pub fn ingest_one(&self, item: IngestRequest) -> Result<EventView> {
        let valid = item.validate()?;
        let mut pending = Some(valid);
        let event = self.store.atomically(&mut |tx| {
            let valid = pending
                .take()
                .ok_or_else(|| EventError::storage("unit of work re-entered"))?;
            let category = resolver::resolve_category(tx, &valid.category)?;
            let source = resolver::resolve_source(tx, &valid.source)?;
            tx.save(valid.into_new_event(category, source))
        })?;
        Ok(EventView::from(event))
    }

    /// Ingest a batch with per-item atomicity: a failing item is reported and
    /// does not roll back the others.
    pub fn ingest(&self, items: Vec<IngestRequest>) -> IngestReport {
        info!(target: "ingest", count = items.len(), "ingesting events");
        let mut report = IngestReport::default();
        for (index, item) in items.into_iter().enumerate() {
            let title = item.title.clone();
            match self.ingest_one(item) {
                Ok(view) => {
                    counter!("events_ingested_total").increment(1);
                    report.created.push(view);
                }
                Err(e) => {
                    counter!("ingest_failures_total", "kind" => e.kind()).increment(1);
                    warn!(target: "ingest", index, error = %e, "ingest item rejected");
                    report.failures.push(IngestFailure {
                        index,
                        title,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            target: "ingest",
            created = report.created.len(),
            failed = report.failures.len(),
            "ingest finished"
        );
        report
    }

    pub fn get(&self, id: Uuid) -> Result<EventView> {
        self.store
            .find_by_id(id)?
            .map(EventView::from)
            .ok_or_else(|| EventError::NotFound(format!("event {id}")))
    }

    pub fn upcoming(&self, page: PageRequest) -> Result<Page<EventView>> {
        Ok(self
            .store
            .find_upcoming(Utc::now(), page)?
            .map(EventView::from))
    }

    /// Radius + time filter in the store, then delegate ordering to the ranking client.
    ///
    /// `query` and `preferredCategoryIds` are accepted but do not narrow the
    /// candidate set: every event the store returns goes to the ranking engine.
    pub async fn nearby(&self, req: &NearbyRequest) -> Result<Vec<RankedEvent>> {
        let ctx = req.context()?;
        let radius_m = ctx.max_distance_km * 1000.0;
        let candidates =
            self.store
                .find_nearby(ctx.latitude, ctx.longitude, radius_m, Utc::now())?;
        if req.query.is_some() || req.preferred_category_ids.is_some() {
            debug!(target: "ranking", "nearby preferences received; not applied to candidates");
        }

        let views = candidates.iter().map(EventView::from).collect();
        Ok(self.ranking.rank(views, &ctx).await)
    }

    pub fn search(&self, text: &str) -> Result<Vec<EventView>> {
        Ok(self
            .store
            .search(text)?
            .iter()
            .map(EventView::from)
            .collect())
    }

    pub fn by_category(&self, category_id: Uuid) -> Result<Vec<EventView>> {
        Ok(self
            .store
            .find_by_category(category_id, Utc::now())?
            .iter()
            .map(EventView::from)
            .collect())
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        self.store.list_categories()
    }
}
