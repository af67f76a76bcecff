// src/ranking/wire.rs
//! Request/response shapes of the external ranking engine (`POST {base}/rank`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::RankContext;
use crate::model::EventView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized projection of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankCandidate {
    pub id: String,
    pub title: String,
    /// Empty string when the event has no description.
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Empty string when the event has no category name.
    pub category: String,
    // Engagement signals are not tracked yet; always 0.
    pub view_count: u64,
    pub save_count: u64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRequest {
    pub user_location: UserLocation,
    pub max_distance_km: f64,
    pub limit: usize,
    pub events: Vec<RankCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: String,
    pub score: f64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankResponse {
    pub ranked_events: Vec<RankedEntry>,
    /// Observability only.
    pub processing_time_ms: f64,
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl From<&EventView> for RankCandidate {
    fn from(e: &EventView) -> Self {
        Self {
            id: e.id.to_string(),
            title: e.title.clone(),
            description: e.description.clone().unwrap_or_default(),
            latitude: e.latitude,
            longitude: e.longitude,
            start_time: iso(e.start_time),
            end_time: e.end_time.map(iso),
            category: e.category.clone(),
            view_count: 0,
            save_count: 0,
            created_at: iso(e.created_at),
        }
    }
}

impl RankRequest {
    pub fn build(candidates: &[EventView], ctx: &RankContext) -> Self {
        Self {
            user_location: UserLocation {
                latitude: ctx.latitude,
                longitude: ctx.longitude,
            },
            max_distance_km: ctx.max_distance_km,
            limit: ctx.limit,
            events: candidates.iter().map(RankCandidate::from).collect(),
        }
    }
}
