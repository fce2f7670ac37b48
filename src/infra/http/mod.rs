mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{HttpState, build_router};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use time::{OffsetDateTime, format_description::well_known::Rfc2822};

use crate::application::error::FailureReport;
use crate::infra::db::PostgresRepositories;
use crate::infra::error::InfraError;

/// Liveness probe for the backing store.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), InfraError>;
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn check(&self) -> Result<(), InfraError> {
        self.health_check().await.map_err(InfraError::from)
    }
}

fn health_response(result: Result<(), InfraError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            FailureReport::from_error("infra::http::health", StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Set `Cache-Control` and `Expires` from a cached result's expiration.
fn apply_cache_headers(headers: &mut HeaderMap, expires_at: OffsetDateTime) {
    let remaining = (expires_at - OffsetDateTime::now_utc())
        .whole_seconds()
        .max(0);

    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={remaining}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Some(value) = expires_at
        .format(&Rfc2822)
        .ok()
        .and_then(|formatted| HeaderValue::from_str(&formatted).ok())
    {
        headers.insert(header::EXPIRES, value);
    }
}
