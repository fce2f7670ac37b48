//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A client-submitted error report attached to a marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReportRecord {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub title: String,
    pub body: String,
    pub status_code: i32,
    pub status_message: String,
    pub detailed_message: Option<String>,
    pub feature_ids: Vec<String>,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Aggregated install counters for a single listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallMetricsRecord {
    pub listing_id: Uuid,
    pub total: i64,
    pub last_30_days: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
