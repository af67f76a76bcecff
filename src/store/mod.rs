// src/store/mod.rs
//! Event store gateway: persistence of events and their reference rows.
//!
//! Two backends share one contract: [`memory::MemoryStore`] for tests and
//! ephemeral runs, [`sqlite::SqliteStore`] for durable storage.

pub mod memory;
pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Category, Event, NewEvent, Page, PageRequest, Source};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Outcome of inserting a row keyed by a unique name.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Created(T),
    /// Another writer already holds this name.
    Conflict,
}

/// Storage operations. Object safe so that transactional views and whole
/// stores can be handed out as `&dyn StoreOps`.
pub trait StoreOps {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;
    fn insert_category(&self, name: &str) -> Result<InsertOutcome<Category>>;
    fn find_source_by_name(&self, name: &str) -> Result<Option<Source>>;
    fn insert_source(&self, name: &str) -> Result<InsertOutcome<Source>>;
    fn list_categories(&self) -> Result<Vec<Category>>;

    /// Persist a new event; assigns id, `created_at` and `updated_at`.
    fn save(&self, draft: NewEvent) -> Result<Event>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Event>>;
    /// Events with `start_time >= now`, most recently created first.
    fn find_upcoming(&self, now: DateTime<Utc>, page: PageRequest) -> Result<Page<Event>>;
    /// Events with `start_time >= now` within `radius_m` of the point, by start time.
    fn find_nearby(&self, lat: f64, lon: f64, radius_m: f64, now: DateTime<Utc>)
        -> Result<Vec<Event>>;
    fn find_by_category(&self, category_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Event>>;
    /// Case-insensitive substring match on title or description, using `text`
    /// as given (an empty string matches every event).
    fn search(&self, text: &str) -> Result<Vec<Event>>;
}

/// A shareable store that can run a unit of work atomically.
pub trait EventStore: StoreOps + Send + Sync {
    /// Run `work` inside one transaction: committed on `Ok`, rolled back on `Err`.
    fn atomically(&self, work: &mut dyn FnMut(&dyn StoreOps) -> Result<Event>) -> Result<Event>;

    /// Backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

/// Hands out `max(now, last)` so server-assigned timestamps never go backwards.
#[derive(Debug, Default)]
pub(crate) struct MonotonicClock {
    last_ms: std::sync::atomic::AtomicI64,
}

impl MonotonicClock {
    pub(crate) fn tick(&self) -> DateTime<Utc> {
        use std::sync::atomic::Ordering;
        let now = Utc::now().timestamp_millis();
        let prev = self.last_ms.fetch_max(now, Ordering::SeqCst);
        let ms = prev.max(now);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }

    /// Raise the floor to a timestamp loaded from persistent storage.
    pub(crate) fn observe(&self, at: DateTime<Utc>) {
        self.last_ms
            .fetch_max(at.timestamp_millis(), std::sync::atomic::Ordering::SeqCst);
    }
}
