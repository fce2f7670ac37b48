use std::sync::Arc;

use crate::cache::CacheRegistry;
use crate::infra::http::HealthProbe;

#[derive(Clone)]
pub struct AdminState {
    pub caches: CacheRegistry,
    pub health: Arc<dyn HealthProbe>,
}
