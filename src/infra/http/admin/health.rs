use axum::{extract::State, response::Response};

use super::super::health_response;
use super::AdminState;

pub(super) async fn admin_health(State(state): State<AdminState>) -> Response {
    health_response(state.health.check().await)
}
