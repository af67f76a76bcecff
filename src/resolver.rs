// src/resolver.rs
//! Reference data resolver: get-or-create for categories and sources by name.
//!
//! Resolution is "read, else insert, on conflict re-read". The store's
//! uniqueness constraint decides races; a losing writer reads the winner's row.

use tracing::debug;

use crate::error::{EventError, Result};
use crate::model::{Category, Source};
use crate::store::{InsertOutcome, StoreOps};

/// Resolve a category by exact (case-sensitive) name, creating it if absent.
pub fn resolve_category(store: &dyn StoreOps, name: &str) -> Result<Category> {
    get_or_create(
        "category",
        name,
        || store.find_category_by_name(name),
        || store.insert_category(name),
    )
}

/// Resolve a source by exact (case-sensitive) name, creating it if absent.
pub fn resolve_source(store: &dyn StoreOps, name: &str) -> Result<Source> {
    get_or_create(
        "source",
        name,
        || store.find_source_by_name(name),
        || store.insert_source(name),
    )
}

fn get_or_create<T>(
    kind: &str,
    name: &str,
    find: impl Fn() -> Result<Option<T>>,
    insert: impl FnOnce() -> Result<InsertOutcome<T>>,
) -> Result<T> {
    if name.trim().is_empty() {
        return Err(EventError::validation(format!("{kind} name must not be blank")));
    }
    if let Some(row) = find()? {
        return Ok(row);
    }
    match insert()? {
        InsertOutcome::Created(row) => {
            debug!(target: "ingest", kind, name, "reference row created");
            Ok(row)
        }
        InsertOutcome::Conflict => {
            debug!(target: "ingest", kind, name, "lost create race, re-reading");
            find()?.ok_or_else(|| {
                EventError::storage(format!(
                    "{kind} '{name}' conflicted on insert but is not readable"
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Event, NewEvent, Page, PageRequest};
    use crate::store::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::cell::Cell;
    use uuid::Uuid;

    /// Simulates a concurrent writer: the first lookup misses, the insert hits
    /// the uniqueness constraint, and the re-read finds the winner's row.
    struct RacingStore {
        winner: Category,
        lookups: Cell<u32>,
        inserts: Cell<u32>,
    }

    impl StoreOps for RacingStore {
        fn find_category_by_name(&self, _name: &str) -> Result<Option<Category>> {
            let n = self.lookups.get();
            self.lookups.set(n + 1);
            Ok((n > 0).then(|| self.winner.clone()))
        }
        fn insert_category(&self, _name: &str) -> Result<InsertOutcome<Category>> {
            self.inserts.set(self.inserts.get() + 1);
            Ok(InsertOutcome::Conflict)
        }
        fn find_source_by_name(&self, _: &str) -> Result<Option<Source>> {
            Ok(None)
        }
        fn insert_source(&self, _: &str) -> Result<InsertOutcome<Source>> {
            Ok(InsertOutcome::Conflict)
        }
        fn list_categories(&self) -> Result<Vec<Category>> {
            unimplemented!()
        }
        fn save(&self, _: NewEvent) -> Result<Event> {
            unimplemented!()
        }
        fn find_by_id(&self, _: Uuid) -> Result<Option<Event>> {
            unimplemented!()
        }
        fn find_upcoming(&self, _: DateTime<Utc>, _: PageRequest) -> Result<Page<Event>> {
            unimplemented!()
        }
        fn find_nearby(&self, _: f64, _: f64, _: f64, _: DateTime<Utc>) -> Result<Vec<Event>> {
            unimplemented!()
        }
        fn find_by_category(&self, _: Uuid, _: DateTime<Utc>) -> Result<Vec<Event>> {
            unimplemented!()
        }
        fn search(&self, _: &str) -> Result<Vec<Event>> {
            unimplemented!()
        }
    }

    #[test]
    fn conflict_on_insert_rereads_winner() {
        let winner = Category {
            id: Uuid::new_v4(),
            name: "Music".into(),
            description: None,
            icon: None,
        };
        let store = RacingStore {
            winner: winner.clone(),
            lookups: Cell::new(0),
            inserts: Cell::new(0),
        };
        let got = resolve_category(&store, "Music").unwrap();
        assert_eq!(got, winner);
        assert_eq!(store.inserts.get(), 1);
        assert_eq!(store.lookups.get(), 2);
    }

    #[test]
    fn conflict_without_readable_row_is_storage_error() {
        let store = RacingStore {
            winner: Category {
                id: Uuid::new_v4(),
                name: "x".into(),
                description: None,
                icon: None,
            },
            lookups: Cell::new(0),
            inserts: Cell::new(0),
        };
        let err = resolve_source(&store, "Feed").unwrap_err();
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn existing_row_is_reused() {
        let store = MemoryStore::new();
        let a = resolve_source(&store, "EventbriteFeed").unwrap();
        let b = resolve_source(&store, "EventbriteFeed").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn blank_name_is_rejected() {
        let store = MemoryStore::new();
        let err = resolve_category(&store, "  ").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }
}
