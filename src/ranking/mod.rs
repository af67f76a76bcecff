// src/ranking/mod.rs
//! Ranking client: delegates scoring of a candidate set to the external
//! ranking engine and reconciles the answer back onto the candidates.
//!
//! The engine is untrusted. Any failure (transport, timeout, bad status,
//! malformed body) degrades to the first `limit` candidates in
//! their original order, unscored. Nothing here returns an error.

pub mod http;
pub mod wire;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::error::RankingError;
use crate::model::{EventView, RankedEvent, Ranking};

pub use http::HttpRankingEngine;
pub use wire::{RankCandidate, RankRequest, RankResponse, RankedEntry};

pub const DEFAULT_RANKING_TIMEOUT: Duration = Duration::from_secs(3);

/// Query context handed to the engine alongside the candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct RankContext {
    pub latitude: f64,
    pub longitude: f64,
    pub max_distance_km: f64,
    pub limit: usize,
}

/// Low-level provider: one remote round trip, no fallback logic.
pub trait RankingEngine: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        req: &'a RankRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RankResponse, RankingError>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Used when no ranking engine is configured; every query degrades.
pub struct DisabledEngine;

impl RankingEngine for DisabledEngine {
    fn fetch<'a>(
        &'a self,
        _req: &'a RankRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RankResponse, RankingError>> + Send + 'a>> {
        Box::pin(async { Err(RankingError::Disabled) })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Clone)]
pub struct RankingClient {
    engine: Arc<dyn RankingEngine>,
    timeout: Duration,
}

impl RankingClient {
    pub fn new(engine: Arc<dyn RankingEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledEngine), DEFAULT_RANKING_TIMEOUT)
    }

    /// Build from an optional base URL; `None` (or a client build failure)
    /// yields a disabled client.
    pub fn from_url(base_url: Option<&str>, timeout: Duration) -> Self {
        match base_url {
            Some(url) => match HttpRankingEngine::new(url, timeout) {
                Ok(engine) => {
                    info!(
                        target: "ranking",
                        endpoint = engine.endpoint(),
                        timeout_ms = timeout.as_millis() as u64,
                        "ranking engine configured"
                    );
                    Self::new(Arc::new(engine), timeout)
                }
                Err(e) => {
                    warn!(target: "ranking", error = %e, "ranking engine client unavailable, ranking disabled");
                    Self::disabled()
                }
            },
            None => Self::disabled(),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Rank `candidates`; never fails.
    ///
    /// Dropping the returned future (e.g. the HTTP caller went away) drops the
    /// in-flight engine request with it; there is no one left to fall back for.
    pub async fn rank(&self, candidates: Vec<EventView>, ctx: &RankContext) -> Vec<RankedEvent> {
        if candidates.is_empty() {
            return Vec::new();
        }

        counter!("ranking_requests_total").increment(1);
        let req = RankRequest::build(&candidates, ctx);
        let started = Instant::now();
        let outcome = self.call(&req).await;
        histogram!("ranking_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome.and_then(|resp| reconcile(&candidates, resp)) {
            Ok(ranked) => ranked,
            Err(e) => {
                counter!("ranking_fallback_total", "reason" => e.reason()).increment(1);
                warn!(
                    target: "ranking",
                    error = %e,
                    engine = self.engine.name(),
                    candidates = candidates.len(),
                    "failed to rank events using ranking engine, returning unranked"
                );
                fallback(candidates, ctx.limit)
            }
        }
    }

    async fn call(&self, req: &RankRequest) -> Result<RankResponse, RankingError> {
        match tokio::time::timeout(self.timeout, self.engine.fetch(req)).await {
            Ok(r) => r,
            Err(_) => Err(RankingError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Attach scores in engine order; unknown ids are dropped, each candidate at most once.
fn reconcile(
    candidates: &[EventView],
    resp: RankResponse,
) -> Result<Vec<RankedEvent>, RankingError> {
    let mut by_id: HashMap<String, &EventView> = candidates
        .iter()
        .map(|c| (c.id.to_string(), c))
        .collect();

    let mut out = Vec::with_capacity(resp.ranked_events.len().min(candidates.len()));
    for entry in resp.ranked_events {
        if !entry.score.is_finite() || !entry.distance_km.is_finite() {
            return Err(RankingError::Malformed(format!(
                "non-finite score/distance for id {}",
                entry.id
            )));
        }
        if let Some(ev) = by_id.remove(&entry.id) {
            out.push(RankedEvent {
                event: ev.clone(),
                ranking: Some(Ranking {
                    distance_km: entry.distance_km,
                    score: entry.score,
                }),
            });
        }
    }

    histogram!("ranking_engine_processing_ms").record(resp.processing_time_ms);
    info!(
        target: "ranking",
        ranked = out.len(),
        processing_ms = resp.processing_time_ms,
        "ranked events"
    );
    Ok(out)
}

fn fallback(candidates: Vec<EventView>, limit: usize) -> Vec<RankedEvent> {
    candidates
        .into_iter()
        .take(limit)
        .map(RankedEvent::unscored)
        .collect()
}
