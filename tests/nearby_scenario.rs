// tests/nearby_scenario.rs
//
// Orchestrator-level scenarios over both store backends: candidate selection
// for ranking, degraded ordering, radius monotonicity, round trip, and
// rejection of out-of-range input. Also pins that text is stored and
// searched exactly as given.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use nearby_events::ingest::IngestRequest;
use nearby_events::ranking::{RankRequest, RankResponse, RankingEngine};
use nearby_events::store::{EventStore, MemoryStore, SqliteStore, StoreOps};
use nearby_events::{EventError, EventService, NearbyRequest, RankingClient, RankingError};

/// Records every request and then fails, as if the engine were down.
#[derive(Default)]
struct DownEngine {
    seen: Mutex<Vec<RankRequest>>,
}

impl RankingEngine for DownEngine {
    fn fetch<'a>(
        &'a self,
        req: &'a RankRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RankResponse, RankingError>> + Send + 'a>> {
        self.seen.lock().unwrap().push(req.clone());
        Box::pin(async { Err(RankingError::Transport("connection refused".into())) })
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

fn item(title: &str, lat: f64, lon: f64, hours_ahead: i64) -> IngestRequest {
    serde_json::from_value(json!({
        "title": title,
        "latitude": lat,
        "longitude": lon,
        "start_time": (Utc::now() + chrono::Duration::hours(hours_ahead)).to_rfc3339(),
        "category": "Concerts",
        "source": "EventbriteFeed"
    }))
    .unwrap()
}

fn stores() -> Vec<Arc<dyn EventStore>> {
    vec![
        Arc::new(MemoryStore::new()),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    ]
}

/// Three events within 5 km of (40.7, -74.0), inserted out of start-time order,
/// plus two outside the radius.
fn seed(svc: &EventService) {
    let report = svc.ingest(vec![
        item("in-c", 40.7200, -74.0100, 6),
        item("out-north", 40.8000, -74.0000, 1),
        item("in-a", 40.7100, -74.0000, 2),
        item("out-far", 41.0000, -74.0000, 3),
        item("in-b", 40.7000, -74.0300, 4),
    ]);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
}

fn request() -> NearbyRequest {
    let mut req = NearbyRequest::at(40.7, -74.0);
    req.max_distance_km = 5.0;
    req.limit = 10;
    req
}

#[tokio::test]
async fn only_in_radius_candidates_reach_the_engine_and_degrade_in_start_order() {
    for store in stores() {
        let engine = Arc::new(DownEngine::default());
        let svc = EventService::new(
            store.clone(),
            RankingClient::new(engine.clone(), Duration::from_secs(1)),
        );
        seed(&svc);

        let out = svc.nearby(&request()).await.unwrap();
        let titles: Vec<&str> = out.iter().map(|r| r.event.title.as_str()).collect();
        assert_eq!(titles, vec!["in-a", "in-b", "in-c"], "backend {}", store.backend());
        assert!(out.iter().all(|r| r.ranking.is_none()));

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let sent: Vec<&str> = seen[0].events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(sent, vec!["in-a", "in-b", "in-c"]);
        assert_eq!(seen[0].limit, 10);
    }
}

#[tokio::test]
async fn fallback_respects_limit() {
    let svc = EventService::new(Arc::new(MemoryStore::new()), RankingClient::disabled());
    seed(&svc);
    let mut req = request();
    req.limit = 2;
    let out = svc.nearby(&req).await.unwrap();
    let titles: Vec<&str> = out.iter().map(|r| r.event.title.as_str()).collect();
    assert_eq!(titles, vec!["in-a", "in-b"]);
}

#[tokio::test]
async fn empty_area_never_calls_the_engine() {
    let engine = Arc::new(DownEngine::default());
    let svc = EventService::new(
        Arc::new(MemoryStore::new()),
        RankingClient::new(engine.clone(), Duration::from_secs(1)),
    );
    seed(&svc);
    let out = svc.nearby(&NearbyRequest::at(-33.86, 151.2)).await.unwrap();
    assert!(out.is_empty());
    assert!(engine.seen.lock().unwrap().is_empty());
}

#[test]
fn growing_radius_only_adds_events() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        seed(&svc);
        svc.ingest(vec![item("past", 40.7, -74.0, -2)]);

        let now = Utc::now();
        let mut previous: BTreeSet<Uuid> = BTreeSet::new();
        for km in [0.5, 1.5, 3.0, 5.0, 15.0, 50.0] {
            let found = store.find_nearby(40.7, -74.0, km * 1000.0, now).unwrap();
            assert!(found.iter().all(|e| e.start_time >= now));
            assert!(found.iter().all(|e| e.title != "past"));
            let ids: BTreeSet<Uuid> = found.iter().map(|e| e.id).collect();
            assert!(previous.is_subset(&ids), "radius {km} km lost events");
            previous = ids;
        }
        assert_eq!(previous.len(), 5);
    }
}

#[test]
fn ingested_event_round_trips_by_id() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        let mut raw = item("Round trip", 40.7128, -74.006, 12);
        raw.raw_data = Some(json!({ "eventbrite_id": 42, "tags": ["a", "b"] }));
        let input = raw.clone();

        let created = svc.ingest_one(raw).unwrap();
        let got = svc.get(created.id).unwrap();
        assert_eq!(got.title, "Round trip");
        assert_eq!(got.latitude, 40.7128);
        assert_eq!(got.longitude, -74.006);
        assert_eq!(
            got.start_time.timestamp_millis(),
            input.start_time.unwrap().timestamp_millis()
        );
        assert_eq!(got.category, "Concerts");
        assert_eq!(got.source, "EventbriteFeed");

        let stored = store.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(stored.raw_data, input.raw_data);
    }
}

#[test]
fn out_of_range_latitude_creates_nothing() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        let err = svc.ingest_one(item("bad", 91.0, -74.0, 1)).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
        assert!(store.list_categories().unwrap().is_empty());
        assert!(store.find_source_by_name("EventbriteFeed").unwrap().is_none());
        assert_eq!(
            store
                .find_upcoming(Utc::now() - chrono::Duration::days(1), Default::default())
                .unwrap()
                .total_elements,
            0
        );
    }
}

#[test]
fn text_fields_round_trip_exactly_as_sent() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        let mut raw = item("  Jazz Night ", 40.7, -74.0, 3);
        raw.description = Some("   ".into());
        raw.address = Some(" 5th Ave ".into());

        let created = svc.ingest_one(raw).unwrap();
        let got = svc.get(created.id).unwrap();
        assert_eq!(got.title, "  Jazz Night ", "backend {}", store.backend());
        assert_eq!(got.description.as_deref(), Some("   "));
        assert_eq!(got.address.as_deref(), Some(" 5th Ave "));
    }
}

#[test]
fn reference_names_resolve_by_exact_value() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        let plain = svc.ingest_one(item("a", 40.7, -74.0, 1)).unwrap();
        let mut padded = item("b", 40.7, -74.0, 1);
        padded.category = Some("Concerts ".into());
        padded.source = Some("eventbritefeed".into());
        let padded = svc.ingest_one(padded).unwrap();

        assert_ne!(plain.category_id, padded.category_id);
        assert_ne!(plain.source_id, padded.source_id);
        let names: Vec<String> = store
            .list_categories()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Concerts".to_string(), "Concerts ".to_string()]);

        let mut blank = item("c", 40.7, -74.0, 1);
        blank.category = Some("  ".into());
        assert!(matches!(svc.ingest_one(blank), Err(EventError::Validation(_))));
    }
}

#[tokio::test]
async fn nearby_preferences_leave_the_candidate_set_intact() {
    for store in stores() {
        let engine = Arc::new(DownEngine::default());
        let svc = EventService::new(
            store.clone(),
            RankingClient::new(engine.clone(), Duration::from_secs(1)),
        );
        seed(&svc);

        let mut req = request();
        req.query = Some("in-a".into());
        req.preferred_category_ids = Some(vec![Uuid::new_v4()]);
        let out = svc.nearby(&req).await.unwrap();
        let titles: Vec<&str> = out.iter().map(|r| r.event.title.as_str()).collect();
        assert_eq!(titles, vec!["in-a", "in-b", "in-c"], "backend {}", store.backend());
        assert_eq!(engine.seen.lock().unwrap()[0].events.len(), 3);
    }
}

#[test]
fn search_uses_the_query_as_given() {
    for store in stores() {
        let svc = EventService::new(store.clone(), RankingClient::disabled());
        svc.ingest(vec![item("Jazz", 40.7, -74.0, 1), item("Opera", 40.7, -74.0, 2)]);

        assert_eq!(svc.search("").unwrap().len(), 2, "backend {}", store.backend());
        assert_eq!(svc.search("jAZZ").unwrap().len(), 1);
        assert!(svc.search("jazz ").unwrap().is_empty());
        assert!(svc.search(" jazz").unwrap().is_empty());
    }
}
