// src/store/memory.rs
//! In-process store. Same contract as the SQLite backend; units of work are
//! serialized by the state lock and rolled back from a snapshot on error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{EventStore, InsertOutcome, MonotonicClock, StoreOps};
use crate::error::{EventError, Result};
use crate::geo::{self, BoundingBox};
use crate::model::{Category, Event, NewEvent, Page, PageRequest, Source};

#[derive(Debug, Default, Clone)]
struct State {
    categories: HashMap<String, Category>,
    sources: HashMap<String, Source>,
    /// Insertion order, which is also `created_at` order.
    events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    clock: MonotonicClock,
    fail_event_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with a storage error (test hook).
    pub fn set_event_writes_failing(&self, failing: bool) {
        self.fail_event_writes.store(failing, Ordering::SeqCst);
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    fn view<R>(&self, f: impl FnOnce(&MemoryTx<'_>) -> R) -> R {
        let mut guard = self.state.lock();
        let tx = MemoryTx {
            state: RefCell::new(&mut *guard),
            store: self,
        };
        f(&tx)
    }
}

/// Borrowed view over locked state; implements the operations once for both
/// plain calls and units of work.
struct MemoryTx<'a> {
    state: RefCell<&'a mut State>,
    store: &'a MemoryStore,
}

fn upcoming_sorted(mut out: Vec<Event>) -> Vec<Event> {
    out.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    out
}

impl StoreOps for MemoryTx<'_> {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.state.borrow().categories.get(name).cloned())
    }

    fn insert_category(&self, name: &str) -> Result<InsertOutcome<Category>> {
        let mut state = self.state.borrow_mut();
        if state.categories.contains_key(name) {
            return Ok(InsertOutcome::Conflict);
        }
        let row = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            icon: None,
        };
        state.categories.insert(name.to_string(), row.clone());
        Ok(InsertOutcome::Created(row))
    }

    fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        Ok(self.state.borrow().sources.get(name).cloned())
    }

    fn insert_source(&self, name: &str) -> Result<InsertOutcome<Source>> {
        let mut state = self.state.borrow_mut();
        if state.sources.contains_key(name) {
            return Ok(InsertOutcome::Conflict);
        }
        let row = Source {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        state.sources.insert(name.to_string(), row.clone());
        Ok(InsertOutcome::Created(row))
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut out: Vec<Category> = self.state.borrow().categories.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn save(&self, draft: NewEvent) -> Result<Event> {
        if self.store.fail_event_writes.load(Ordering::SeqCst) {
            return Err(EventError::storage("event table unavailable"));
        }
        let event = Event::from_new(Uuid::new_v4(), draft, self.store.clock.tick());
        self.state.borrow_mut().events.push(event.clone());
        Ok(event)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self
            .state
            .borrow()
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    fn find_upcoming(&self, now: DateTime<Utc>, page: PageRequest) -> Result<Page<Event>> {
        let state = self.state.borrow();
        let upcoming: Vec<&Event> = state
            .events
            .iter()
            .rev()
            .filter(|e| e.start_time >= now)
            .collect();
        let total = upcoming.len() as u64;
        let content = upcoming
            .into_iter()
            .skip(page.offset())
            .take(page.size as usize)
            .cloned()
            .collect();
        Ok(Page::new(content, page, total))
    }

    fn find_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let bbox = BoundingBox::around(lat, lon, radius_m);
        let out = self
            .state
            .borrow()
            .events
            .iter()
            .filter(|e| e.start_time >= now)
            .filter(|e| bbox.contains(e.latitude, e.longitude))
            .filter(|e| geo::distance_m(lat, lon, e.latitude, e.longitude) <= radius_m)
            .cloned()
            .collect();
        Ok(upcoming_sorted(out))
    }

    fn find_by_category(&self, category_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let out = self
            .state
            .borrow()
            .events
            .iter()
            .filter(|e| e.category.id == category_id && e.start_time >= now)
            .cloned()
            .collect();
        Ok(upcoming_sorted(out))
    }

    fn search(&self, text: &str) -> Result<Vec<Event>> {
        let needle = text.to_lowercase();
        let out = self
            .state
            .borrow()
            .events
            .iter()
            .filter(|e| e.matches_text(&needle))
            .cloned()
            .collect();
        Ok(upcoming_sorted(out))
    }
}

impl StoreOps for MemoryStore {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.view(|v| v.find_category_by_name(name))
    }
    fn insert_category(&self, name: &str) -> Result<InsertOutcome<Category>> {
        self.view(|v| v.insert_category(name))
    }
    fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        self.view(|v| v.find_source_by_name(name))
    }
    fn insert_source(&self, name: &str) -> Result<InsertOutcome<Source>> {
        self.view(|v| v.insert_source(name))
    }
    fn list_categories(&self) -> Result<Vec<Category>> {
        self.view(|v| v.list_categories())
    }
    fn save(&self, draft: NewEvent) -> Result<Event> {
        self.view(|v| v.save(draft))
    }
    fn find_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        self.view(|v| v.find_by_id(id))
    }
    fn find_upcoming(&self, now: DateTime<Utc>, page: PageRequest) -> Result<Page<Event>> {
        self.view(|v| v.find_upcoming(now, page))
    }
    fn find_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.view(|v| v.find_nearby(lat, lon, radius_m, now))
    }
    fn find_by_category(&self, category_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.view(|v| v.find_by_category(category_id, now))
    }
    fn search(&self, text: &str) -> Result<Vec<Event>> {
        self.view(|v| v.search(text))
    }
}

impl EventStore for MemoryStore {
    fn atomically(&self, work: &mut dyn FnMut(&dyn StoreOps) -> Result<Event>) -> Result<Event> {
        let mut guard = self.state.lock();
        let snapshot = guard.clone();
        let result = {
            let tx = MemoryTx {
                state: RefCell::new(&mut *guard),
                store: self,
            };
            work(&tx)
        };
        if result.is_err() {
            *guard = snapshot;
        }
        result
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(store: &MemoryStore, title: &str, lat: f64, lon: f64, start: DateTime<Utc>) -> NewEvent {
        let category = match store.insert_category("Music").unwrap() {
            InsertOutcome::Created(c) => c,
            InsertOutcome::Conflict => store.find_category_by_name("Music").unwrap().unwrap(),
        };
        let source = match store.insert_source("Feed").unwrap() {
            InsertOutcome::Created(s) => s,
            InsertOutcome::Conflict => store.find_source_by_name("Feed").unwrap().unwrap(),
        };
        NewEvent {
            title: title.into(),
            description: Some(format!("{title} description")),
            latitude: lat,
            longitude: lon,
            address: None,
            start_time: start,
            end_time: None,
            category,
            source,
            source_url: None,
            image_url: None,
            organizer_name: None,
            organizer_contact: None,
            capacity: None,
            raw_data: None,
        }
    }

    #[test]
    fn insert_category_reports_conflict_on_existing_name() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert_category("Music").unwrap(),
            InsertOutcome::Created(_)
        ));
        assert_eq!(store.insert_category("Music").unwrap(), InsertOutcome::Conflict);
        // case-sensitive key
        assert!(matches!(
            store.insert_category("music").unwrap(),
            InsertOutcome::Created(_)
        ));
    }

    #[test]
    fn nearby_filters_by_time_and_radius_and_orders_by_start() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let later = draft(&store, "later", 40.701, -74.0, now + Duration::hours(5));
        let sooner = draft(&store, "sooner", 40.702, -74.0, now + Duration::hours(1));
        let past = draft(&store, "past", 40.7, -74.0, now - Duration::hours(1));
        let far = draft(&store, "far", 41.5, -74.0, now + Duration::hours(2));
        for d in [later, sooner, past, far] {
            store.save(d).unwrap();
        }

        let got = store.find_nearby(40.7, -74.0, 5_000.0, now).unwrap();
        let titles: Vec<_> = got.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["sooner", "later"]);
    }

    #[test]
    fn upcoming_is_newest_created_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for t in ["a", "b", "c"] {
            let d = draft(&store, t, 0.0, 0.0, now + Duration::hours(1));
            store.save(d).unwrap();
        }
        let page = store.find_upcoming(now, PageRequest::new(0, 2)).unwrap();
        let titles: Vec<_> = page.content.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b"]);
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn failed_unit_of_work_rolls_back_reference_rows() {
        let store = MemoryStore::new();
        let res = store.atomically(&mut |tx| {
            let _ = tx.insert_category("Sports")?;
            Err(EventError::storage("boom"))
        });
        assert!(res.is_err());
        assert!(store.find_category_by_name("Sports").unwrap().is_none());
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save(draft(&store, "Open Mic Night", 0.0, 0.0, now))
            .unwrap();
        assert_eq!(store.search("open mic").unwrap().len(), 1);
        assert_eq!(store.search("NIGHT DESCRIPTION").unwrap().len(), 1);
        // the query is used as given: empty matches everything, padding is significant
        assert_eq!(store.search("").unwrap().len(), 1);
        assert!(store.search(" open mic").unwrap().is_empty());
    }
}
