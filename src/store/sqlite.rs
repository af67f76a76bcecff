// src/store/sqlite.rs
//! SQLite-backed event store.
//!
//! Uniqueness of category/source names is enforced by the schema; inserts use
//! `ON CONFLICT(name) DO NOTHING` and report [`InsertOutcome::Conflict`] when
//! another writer got there first. Radius filtering runs inside the query via
//! the `geodesic_m` scalar function registered on the connection.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::{schema, EventStore, InsertOutcome, MonotonicClock, StoreOps};
use crate::error::{EventError, Result};
use crate::geo::{self, BoundingBox};
use crate::model::{Category, Event, NewEvent, Page, PageRequest, Source};

const EVENT_COLUMNS: &str = "
    e.id, e.title, e.description, e.latitude, e.longitude, e.address,
    e.start_time, e.end_time,
    c.id, c.name, c.description, c.icon,
    s.id, s.name,
    e.source_url, e.image_url, e.organizer_name, e.organizer_contact,
    e.capacity, e.is_verified, e.raw_data, e.created_at, e.updated_at";

const EVENT_FROM: &str = "
    FROM events e
    JOIN categories c ON c.id = e.category_id
    JOIN sources s ON s.id = e.source_id";

pub struct SqliteStore {
    /// SQLite connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    clock: MonotonicClock,
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EventError::storage(format!("create db dir: {e}")))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| EventError::storage(format!("failed to open SQLite: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        // Other processes may hold the write lock briefly.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::prepare(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EventError::storage(format!("failed to open in-memory SQLite: {e}")))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        register_functions(&conn)?;
        schema::init_schema(&conn)?;

        let clock = MonotonicClock::default();
        let latest: Option<i64> =
            conn.query_row("SELECT MAX(updated_at) FROM events", [], |r| r.get(0))?;
        if let Some(at) = latest.and_then(DateTime::from_timestamp_millis) {
            clock.observe(at);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn view<R>(&self, f: impl FnOnce(&SqliteTx<'_>) -> R) -> R {
        let conn = self.conn.lock();
        f(&SqliteTx {
            conn: &conn,
            clock: &self.clock,
        })
    }
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("geodesic_m", 4, flags, |ctx| {
        let lat1: f64 = ctx.get(0)?;
        let lon1: f64 = ctx.get(1)?;
        let lat2: f64 = ctx.get(2)?;
        let lon2: f64 = ctx.get(3)?;
        Ok(geo::distance_m(lat1, lon1, lat2, lon2))
    })?;
    // SQLite's lower() only folds ASCII.
    conn.create_scalar_function("fold_case", 1, flags, |ctx| {
        let s: Option<String> = ctx.get(0)?;
        Ok(s.unwrap_or_default().to_lowercase())
    })?;
    Ok(())
}

fn conversion_err(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, msg.into())
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, Type::Text, e.to_string()))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| conversion_err(idx, Type::Integer, format!("timestamp out of range: {ms}")))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => ts_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn category_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
    })
}

fn source_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
    })
}

fn event_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let capacity = match row.get::<_, Option<i64>>(18)? {
        Some(n) => Some(
            u32::try_from(n).map_err(|e| conversion_err(18, Type::Integer, e.to_string()))?,
        ),
        None => None,
    };
    let raw_data = match row.get::<_, Option<String>>(20)? {
        Some(s) => Some(
            serde_json::from_str(&s).map_err(|e| conversion_err(20, Type::Text, e.to_string()))?,
        ),
        None => None,
    };
    Ok(Event {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        address: row.get(5)?,
        start_time: ts_at(row, 6)?,
        end_time: opt_ts_at(row, 7)?,
        category: Category {
            id: uuid_at(row, 8)?,
            name: row.get(9)?,
            description: row.get(10)?,
            icon: row.get(11)?,
        },
        source: Source {
            id: uuid_at(row, 12)?,
            name: row.get(13)?,
        },
        source_url: row.get(14)?,
        image_url: row.get(15)?,
        organizer_name: row.get(16)?,
        organizer_contact: row.get(17)?,
        capacity,
        is_verified: row.get(19)?,
        raw_data,
        created_at: ts_at(row, 21)?,
        updated_at: ts_at(row, 22)?,
    })
}

/// Operations over a borrowed connection (plain or inside a transaction).
struct SqliteTx<'a> {
    conn: &'a Connection,
    clock: &'a MonotonicClock,
}

impl SqliteTx<'_> {
    fn query_events(&self, tail: &str, params: impl rusqlite::Params) -> Result<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} {EVENT_FROM} {tail}");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params, event_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl StoreOps for SqliteTx<'_> {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, description, icon FROM categories WHERE name = ?1",
                [name],
                category_row,
            )
            .optional()?)
    }

    fn insert_category(&self, name: &str) -> Result<InsertOutcome<Category>> {
        let id = Uuid::new_v4();
        let changed = self.conn.execute(
            "INSERT INTO categories (id, name) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            params![id.to_string(), name],
        )?;
        if changed == 0 {
            return Ok(InsertOutcome::Conflict);
        }
        Ok(InsertOutcome::Created(Category {
            id,
            name: name.to_string(),
            description: None,
            icon: None,
        }))
    }

    fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM sources WHERE name = ?1",
                [name],
                source_row,
            )
            .optional()?)
    }

    fn insert_source(&self, name: &str) -> Result<InsertOutcome<Source>> {
        let id = Uuid::new_v4();
        let changed = self.conn.execute(
            "INSERT INTO sources (id, name) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            params![id.to_string(), name],
        )?;
        if changed == 0 {
            return Ok(InsertOutcome::Conflict);
        }
        Ok(InsertOutcome::Created(Source {
            id,
            name: name.to_string(),
        }))
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, name, description, icon FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], category_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn save(&self, draft: NewEvent) -> Result<Event> {
        let raw = draft
            .raw_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| EventError::storage(format!("serialize raw_data: {e}")))?;
        let event = Event::from_new(Uuid::new_v4(), draft, self.clock.tick());

        self.conn.execute(
            "INSERT INTO events (
                id, title, description, latitude, longitude, address,
                start_time, end_time, category_id, source_id,
                source_url, image_url, organizer_name, organizer_contact,
                capacity, is_verified, raw_data, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                event.id.to_string(),
                event.title,
                event.description,
                event.latitude,
                event.longitude,
                event.address,
                event.start_time.timestamp_millis(),
                event.end_time.map(|t| t.timestamp_millis()),
                event.category.id.to_string(),
                event.source.id.to_string(),
                event.source_url,
                event.image_url,
                event.organizer_name,
                event.organizer_contact,
                event.capacity,
                event.is_verified,
                raw,
                event.created_at.timestamp_millis(),
                event.updated_at.timestamp_millis(),
            ],
        )?;
        tracing::debug!(target: "store", id = %event.id, "event inserted");
        Ok(event)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self
            .query_events("WHERE e.id = ?1", [id.to_string()])?
            .into_iter()
            .next())
    }

    fn find_upcoming(&self, now: DateTime<Utc>, page: PageRequest) -> Result<Page<Event>> {
        let now_ms = now.timestamp_millis();
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE start_time >= ?1",
            [now_ms],
            |r| r.get(0),
        )?;
        let content = self.query_events(
            "WHERE e.start_time >= ?1 ORDER BY e.created_at DESC, e.rowid DESC LIMIT ?2 OFFSET ?3",
            params![now_ms, page.size, page.offset() as i64],
        )?;
        Ok(Page::new(content, page, total.max(0) as u64))
    }

    fn find_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let bbox = BoundingBox::around(lat, lon, radius_m);
        self.query_events(
            "WHERE e.start_time >= ?1
               AND e.latitude BETWEEN ?2 AND ?3
               AND geodesic_m(?4, ?5, e.latitude, e.longitude) <= ?6
             ORDER BY e.start_time ASC, e.rowid ASC",
            params![
                now.timestamp_millis(),
                bbox.min_lat,
                bbox.max_lat,
                lat,
                lon,
                radius_m
            ],
        )
    }

    fn find_by_category(&self, category_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.query_events(
            "WHERE e.category_id = ?1 AND e.start_time >= ?2 ORDER BY e.start_time ASC, e.rowid ASC",
            params![category_id.to_string(), now.timestamp_millis()],
        )
    }

    fn search(&self, text: &str) -> Result<Vec<Event>> {
        let needle = text.to_lowercase();
        self.query_events(
            "WHERE ?1 = ''
                OR instr(fold_case(e.title), ?1) > 0
                OR instr(fold_case(e.description), ?1) > 0
             ORDER BY e.start_time ASC, e.rowid ASC",
            [needle],
        )
    }
}

impl StoreOps for SqliteStore {
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

impl EventStore for SqliteStore {
    fn atomically(&self, work: &mut dyn FnMut(&dyn StoreOps) -> Result<Event>) -> Result<Event> {
        let conn = self.conn.lock();
        let tx = rusqlite::Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let result = work(&SqliteTx {
            conn: &tx,
            clock: &self.clock,
        });
        match result {
            Ok(event) => {
                tx.commit()?;
                Ok(event)
            }
            // dropping `tx` rolls back
            Err(e) => Err(e),
        }
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
