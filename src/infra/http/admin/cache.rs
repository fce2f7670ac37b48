use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::application::error::AppError;
use crate::cache::CacheKey;

use super::AdminState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct KeyQuery {
    key: Option<String>,
}

pub(super) async fn list_cache_keys(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(
        state
            .caches
            .cache_keys()
            .into_iter()
            .map(CacheKey::into_string)
            .collect(),
    )
}

pub(super) async fn remove_cache_key(
    State(state): State<AdminState>,
    Query(query): Query<KeyQuery>,
) -> Response {
    let Some(key) = query.key.filter(|key| !key.is_empty()) else {
        return AppError::bad_request("query parameter `key` is required").into_response();
    };

    let removed = state.caches.remove(&CacheKey::from(key.as_str()));
    info!(key = %key, removed, "cache key invalidated by operator");
    StatusCode::NO_CONTENT.into_response()
}

pub(super) async fn remove_all_cache_keys(State(state): State<AdminState>) -> Response {
    let removed = state.caches.remove_all();
    info!(removed, "all caches invalidated by operator");
    StatusCode::NO_CONTENT.into_response()
}

pub(super) async fn cache_max_age(State(state): State<AdminState>) -> Json<BTreeMap<String, u64>> {
    Json(
        state
            .caches
            .iter()
            .map(|cache| (cache.name().to_string(), cache.max_age().as_secs()))
            .collect(),
    )
}
