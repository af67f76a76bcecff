// src/api.rs
//! HTTP surface: thin axum handlers over [`EventService`].

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::EventError;
use crate::ingest::IngestBatch;
use crate::model::{Category, EventView, Page, PageRequest, RankedEvent};
use crate::service::{EventService, IngestFailure, NearbyRequest};

#[derive(Clone)]
pub struct AppState {
    pub service: EventService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/events", get(list_upcoming))
        .route("/api/v1/events/ingest", post(ingest))
        .route("/api/v1/events/nearby", post(nearby))
        .route("/api/v1/events/search", get(search))
        .route("/api/v1/events/category/{category_id}", get(by_category))
        .route("/api/v1/events/{id}", get(get_event))
        .route("/api/v1/categories", get(categories))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// API error rendered as `{ "error": ..., "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl From<EventError> for ApiError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::Validation(m) => Self::BadRequest(m),
            EventError::NotFound(m) => Self::NotFound(m),
            EventError::Storage(m) => Self::Storage(m),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::BadRequest(r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, "validation", m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            Self::Storage(m) => {
                error!(target: "api", error = %m, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage",
                    "A storage error occurred".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid {what} id: {raw}")))
}

#[derive(Debug, Serialize)]
struct IngestResp {
    success: bool,
    count: usize,
    events: Vec<EventView>,
    failures: Vec<IngestFailure>,
}

/// 201 when anything was created (or the batch was empty); otherwise the
/// status of the dominant failure kind, with the same body.
async fn ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestBatch>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResp>), ApiError> {
    let Json(batch) = body?;
    let report = state.service.ingest(batch.events);

    let status = if !report.created.is_empty() || report.failures.is_empty() {
        StatusCode::CREATED
    } else if report.failures.iter().any(|f| f.kind == "storage") {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((
        status,
        Json(IngestResp {
            success: report.failures.is_empty(),
            count: report.created.len(),
            events: report.created,
            failures: report.failures,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<u32>,
    size: Option<u32>,
}

async fn list_upcoming(
    State(state): State<AppState>,
    Query(p): Query<PageParams>,
) -> Result<Json<Page<EventView>>, ApiError> {
    let req = PageRequest::new(
        p.page.unwrap_or(0),
        p.size.unwrap_or(PageRequest::DEFAULT_SIZE),
    );
    Ok(Json(state.service.upcoming(req)?))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let id = parse_id(&id, "event")?;
    Ok(Json(state.service.get(id)?))
}

async fn nearby(
    State(state): State<AppState>,
    body: Result<Json<NearbyRequest>, JsonRejection>,
) -> Result<Json<Vec<RankedEvent>>, ApiError> {
    let Json(req) = body?;
    let ranked = state.service.nearby(&req).await?;
    info!(target: "api", results = ranked.len(), "nearby query served");
    Ok(Json(ranked))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

async fn search(
    State(state): State<AppState>,
    Query(p): Query<SearchParams>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    Ok(Json(state.service.search(&p.query)?))
}

async fn by_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let id = parse_id(&category_id, "category")?;
    Ok(Json(state.service.by_category(id)?))
}

async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.service.categories()?))
}
