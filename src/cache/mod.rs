//! Result caching for resource lookups.
//!
//! Results are stored per endpoint under a key derived from the entity id
//! and the request parameters, kept for a fixed max-age, and computed at most
//! once per key at a time.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_age_seconds = 3600
//! sweep_interval_seconds = 300
//! ```

mod admin;
mod config;
mod keys;
mod store;

pub use admin::{CacheAdmin, CacheRegistry, spawn_sweeper};
pub use config::CacheConfig;
pub use keys::{CacheKey, cache_key};
pub use store::{Cached, CachingService};

/// Counter names emitted by every [`CachingService`], labelled by `cache`.
pub mod metric_names {
    pub use super::store::{
        COALESCED_TOTAL, COMPUTE_FAILURE_TOTAL, EVICT_TOTAL, HIT_TOTAL, MISS_TOTAL,
    };
}
