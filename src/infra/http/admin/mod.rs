mod cache;
mod health;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{delete, get},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/cache/keys",
            get(cache::list_cache_keys).delete(cache::remove_cache_key),
        )
        .route("/cache", delete(cache::remove_all_cache_keys))
        .route("/cache/max_age", get(cache::cache_max_age))
        .route("/health", get(health::admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
