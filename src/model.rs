// src/model.rs
//! Stored records and their response projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference row shared by many events, keyed by its unique `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Ingestion origin (feed, scraper, partner), keyed by its unique `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
}

/// A validated event ready to be persisted. Category and source are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub category: Category,
    pub source: Source,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub organizer_name: Option<String>,
    pub organizer_contact: Option<String>,
    pub capacity: Option<u32>,
    pub raw_data: Option<serde_json::Value>,
}

/// Canonical stored form of an event, joined with its category and source.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub category: Category,
    pub source: Source,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub organizer_name: Option<String>,
    pub organizer_contact: Option<String>,
    pub capacity: Option<u32>,
    pub is_verified: bool,
    pub raw_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Materialize a stored event from a validated draft plus server-assigned fields.
    pub fn from_new(id: Uuid, draft: NewEvent, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            latitude: draft.latitude,
            longitude: draft.longitude,
            address: draft.address,
            start_time: draft.start_time,
            end_time: draft.end_time,
            category: draft.category,
            source: draft.source,
            source_url: draft.source_url,
            image_url: draft.image_url,
            organizer_name: draft.organizer_name,
            organizer_contact: draft.organizer_contact,
            capacity: draft.capacity,
            is_verified: false,
            raw_data: draft.raw_data,
            created_at: at,
            updated_at: at,
        }
    }

    /// Case-insensitive substring match against title or description.
    pub fn matches_text(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle_lower))
    }
}

/// Response projection of an event (what API consumers see).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub category: String,
    pub category_id: Uuid,
    pub source: String,
    pub source_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Event> for EventView {
    fn from(e: &Event) -> Self {
        Self {
            id: e.id,
            title: e.title.clone(),
            description: e.description.clone(),
            latitude: e.latitude,
            longitude: e.longitude,
            address: e.address.clone(),
            start_time: e.start_time,
            end_time: e.end_time,
            category: e.category.name.clone(),
            category_id: e.category.id,
            source: e.source.name.clone(),
            source_id: e.source.id,
            source_url: e.source_url.clone(),
            image_url: e.image_url.clone(),
            organizer_name: e.organizer_name.clone(),
            organizer_contact: e.organizer_contact.clone(),
            capacity: e.capacity,
            is_verified: e.is_verified,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

impl From<Event> for EventView {
    fn from(e: Event) -> Self {
        Self::from(&e)
    }
}

/// Query-time annotation from the ranking engine. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub distance_km: f64,
    pub score: f64,
}

/// An event as returned by a nearby query: scored when ranking succeeded,
/// bare when the ranking client fell back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: EventView,
    #[serde(flatten)]
    pub ranking: Option<Ranking>,
}

impl RankedEvent {
    pub fn unscored(event: EventView) -> Self {
        Self {
            event,
            ranking: None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.ranking.map(|r| r.score)
    }

    pub fn distance_km(&self) -> Option<f64> {
        self.ranking.map(|r| r.distance_km)
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    /// Build a request, clamping `size` to `1..=MAX_SIZE`.
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, req: PageRequest, total_elements: u64) -> Self {
        let size = u64::from(req.size);
        let total_pages = total_elements.div_ceil(size) as u32;
        Self {
            content,
            page: req.page,
            size: req.size,
            total_elements,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> EventView {
        let at = Utc::now();
        EventView {
            id: Uuid::new_v4(),
            title: "Jazz in the park".into(),
            description: None,
            latitude: 40.7,
            longitude: -74.0,
            address: None,
            start_time: at,
            end_time: None,
            category: "Music".into(),
            category_id: Uuid::new_v4(),
            source: "Feed".into(),
            source_id: Uuid::new_v4(),
            source_url: None,
            image_url: None,
            organizer_name: None,
            organizer_contact: None,
            capacity: None,
            is_verified: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn unscored_event_omits_score_and_distance() {
        let v = serde_json::to_value(RankedEvent::unscored(view())).unwrap();
        assert!(v.get("score").is_none());
        assert!(v.get("distanceKm").is_none());
        assert_eq!(v["category"], "Music");
        assert!(v.get("startTime").is_some());
    }

    #[test]
    fn scored_event_carries_both_fields() {
        let r = RankedEvent {
            event: view(),
            ranking: Some(Ranking {
                distance_km: 1.5,
                score: 0.8,
            }),
        };
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["distanceKm"], 1.5);
        assert_eq!(v["score"], 0.8);
    }

    #[test]
    fn page_totals_round_up() {
        let p: Page<u8> = Page::new(vec![1, 2], PageRequest::new(0, 2), 5);
        assert_eq!(p.total_pages, 3);
        assert_eq!(PageRequest::new(3, 0).size, 1);
        assert_eq!(PageRequest::new(0, 10_000).size, PageRequest::MAX_SIZE);
    }
}
