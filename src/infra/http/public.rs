use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::{
    application::resources::{ResourceService, request_params},
    cache::Cached,
    domain::entities::{ErrorReportRecord, InstallMetricsRecord},
};

use super::{
    HealthProbe, apply_cache_headers, health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub error_reports: ResourceService<ErrorReportRecord>,
    pub install_metrics: ResourceService<InstallMetricsRecord>,
    pub health: Arc<dyn HealthProbe>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/error_reports", get(list_error_reports))
        .route("/error_reports/{id}", get(get_error_report))
        .route("/install_metrics", get(list_install_metrics))
        .route("/install_metrics/{id}", get(get_install_metrics))
        .route("/health", get(public_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn list_error_reports(
    State(state): State<HttpState>,
    RawQuery(query): RawQuery,
) -> Response {
    list(&state.error_reports, query).await
}

async fn get_error_report(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    get_one(&state.error_reports, &id, query).await
}

async fn list_install_metrics(
    State(state): State<HttpState>,
    RawQuery(query): RawQuery,
) -> Response {
    list(&state.install_metrics, query).await
}

async fn get_install_metrics(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    get_one(&state.install_metrics, &id, query).await
}

async fn public_health(State(state): State<HttpState>) -> Response {
    health_response(state.health.check().await)
}

async fn list<R>(service: &ResourceService<R>, query: Option<String>) -> Response
where
    R: Serialize + Clone + Send + Sync + 'static,
{
    let params = request_params(service.entity(), query.as_deref());
    match service.list(&params).await {
        Ok(cached) => cached_json(cached),
        Err(err) => err.into_response(),
    }
}

async fn get_one<R>(service: &ResourceService<R>, id: &str, query: Option<String>) -> Response
where
    R: Serialize + Clone + Send + Sync + 'static,
{
    let params = request_params(service.entity(), query.as_deref());
    match service.get(id, params).await {
        Ok(cached) => cached_json(cached),
        Err(err) => err.into_response(),
    }
}

fn cached_json<T: Serialize>(cached: Cached<T>) -> Response {
    let mut response = Json(cached.value).into_response();
    apply_cache_headers(response.headers_mut(), cached.expires_at);
    response
}
