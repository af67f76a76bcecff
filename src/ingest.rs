// src/ingest.rs
//! Ingestion input shape and per-item validation.
//!
//! Every field is optional at the serde level so that one malformed item is
//! reported on its own instead of rejecting the whole batch at decode time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::geo;
use crate::model::{Category, NewEvent, Source};

/// Request body of the ingest endpoint: `{ "events": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBatch {
    #[serde(default)]
    pub events: Vec<IngestRequest>,
}

/// One raw event as delivered by a feed, scraper or partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    #[serde(alias = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(alias = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub source: Option<String>,
    #[serde(alias = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
    pub organizer: Option<String>,
    #[serde(alias = "organizerContact")]
    pub organizer_contact: Option<String>,
    pub capacity: Option<i64>,
    #[serde(alias = "rawData")]
    pub raw_data: Option<serde_json::Value>,
}

/// An item that passed validation; category and source still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidIngest {
    pub category: String,
    pub source: String,
    fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
struct Fields {
    title: String,
    description: Option<String>,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    source_url: Option<String>,
    image_url: Option<String>,
    organizer_name: Option<String>,
    organizer_contact: Option<String>,
    capacity: Option<u32>,
    raw_data: Option<serde_json::Value>,
}

/// Blank means missing; a present value is kept exactly as sent.
fn required_text(v: Option<String>, field: &str) -> Result<String, EventError> {
    match v {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(EventError::validation(format!("{field} is required"))),
    }
}

impl IngestRequest {
    pub fn validate(self) -> Result<ValidIngest, EventError> {
        let title = required_text(self.title, "title")?;
        let latitude = self
            .latitude
            .ok_or_else(|| EventError::validation("latitude is required"))?;
        let longitude = self
            .longitude
            .ok_or_else(|| EventError::validation("longitude is required"))?;
        geo::validate_point(latitude, longitude)?;
        let start_time = self
            .start_time
            .ok_or_else(|| EventError::validation("start_time is required"))?;
        if let Some(end) = self.end_time {
            if end < start_time {
                return Err(EventError::validation("end_time must not be before start_time"));
            }
        }
        let category = required_text(self.category, "category")?;
        let source = required_text(self.source, "source")?;
        let capacity = match self.capacity {
            Some(n) => Some(u32::try_from(n).map_err(|_| {
                EventError::validation(format!("capacity must be a non-negative integer, got {n}"))
            })?),
            None => None,
        };

        Ok(ValidIngest {
            category,
            source,
            fields: Fields {
                title,
                description: self.description,
                latitude,
                longitude,
                address: self.address,
                start_time,
                end_time: self.end_time,
                source_url: self.source_url,
                image_url: self.image_url,
                organizer_name: self.organizer,
                organizer_contact: self.organizer_contact,
                capacity,
                raw_data: self.raw_data.filter(|v| !v.is_null()),
            },
        })
    }
}

impl ValidIngest {
    /// Attach resolved reference rows, producing a persistable draft.
    pub fn into_new_event(self, category: Category, source: Source) -> NewEvent {
        let f = self.fields;
        NewEvent {
            title: f.title,
            description: f.description,
            latitude: f.latitude,
            longitude: f.longitude,
            address: f.address,
            start_time: f.start_time,
            end_time: f.end_time,
            category,
            source,
            source_url: f.source_url,
            image_url: f.image_url,
            organizer_name: f.organizer_name,
            organizer_contact: f.organizer_contact,
            capacity: f.capacity,
            raw_data: f.raw_data,
        }
    }
}
