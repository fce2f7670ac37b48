//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable tag for each kind of record the API serves.
///
/// Filters, statements and caches are keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ErrorReport,
    InstallMetrics,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::ErrorReport, EntityType::InstallMetrics];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::ErrorReport => "error_report",
            EntityType::InstallMetrics => "install_metrics",
        }
    }

    /// Endpoint identifier used for routing and cache keys.
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityType::ErrorReport => "error_reports",
            EntityType::InstallMetrics => "install_metrics",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
