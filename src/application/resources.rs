//! Read-only resource lookups served through the result cache.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::application::error::AppError;
use crate::application::filter::FilterRegistry;
use crate::application::params::{RequestParams, UrlParameterName};
use crate::application::repos::StatementExecutor;
use crate::application::statement::StatementBuilder;
use crate::cache::{CacheKey, Cached, CachingService};
use crate::domain::types::EntityType;

/// Cache id used for collection lookups.
pub const COLLECTION_ID: &str = "all";

/// Resolves requests for one entity type.
///
/// Statements are built and validated before the cache is consulted, so a
/// malformed request never occupies a cache slot.
pub struct ResourceService<R> {
    entity: EntityType,
    registry: Arc<FilterRegistry>,
    builder: Arc<dyn StatementBuilder>,
    executor: Arc<dyn StatementExecutor<R>>,
    cache: CachingService<Vec<R>>,
}

impl<R> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity,
            registry: Arc::clone(&self.registry),
            builder: Arc::clone(&self.builder),
            executor: Arc::clone(&self.executor),
            cache: self.cache.clone(),
        }
    }
}

impl<R> ResourceService<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(
        entity: EntityType,
        registry: Arc<FilterRegistry>,
        builder: Arc<dyn StatementBuilder>,
        executor: Arc<dyn StatementExecutor<R>>,
        cache: CachingService<Vec<R>>,
    ) -> Self {
        Self {
            entity,
            registry,
            builder,
            executor,
            cache,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn cache(&self) -> &CachingService<Vec<R>> {
        &self.cache
    }

    /// Records matching the request's filters.
    #[instrument(skip_all, fields(entity = %self.entity))]
    pub async fn list(&self, params: &RequestParams) -> Result<Cached<Vec<R>>, AppError> {
        self.resolve(COLLECTION_ID, params).await
    }

    /// The record identified by `id`, still subject to the request's filters.
    #[instrument(skip_all, fields(entity = %self.entity, id = %id))]
    /// The path `id` takes precedence over any `id` in the query.
    pub async fn get(&self, id: &str, mut params: RequestParams) -> Result<Cached<R>, AppError> {
        params.set_param(UrlParameterName::Id, id);
        let cached = self.resolve(id, &params).await?;

        let Some(record) = cached.value.into_iter().next() else {
            return Err(AppError::NotFound);
        };
        Ok(Cached {
            value: record,
            created_at: cached.created_at,
            expires_at: cached.expires_at,
        })
    }

    /// Expiration of the stored result the request would be served from.
    pub fn expiration(&self, id: &str, params: &RequestParams) -> Option<OffsetDateTime> {
        self.cache.expiration(id, params)
    }

    async fn resolve(&self, id: &str, params: &RequestParams) -> Result<Cached<Vec<R>>, AppError> {
        let filter = self.registry.resolve(self.entity)?;
        let statement = filter.build_statement(self.builder.as_ref(), params, true)?;
        let key = CacheKey::for_request(id, params, None);
        debug!(key = %key, statement = %statement, "resolving resource");

        let executor = Arc::clone(&self.executor);
        self.cache
            .fetch(key, move || async move { executor.execute(&statement).await })
            .await
            .ok_or(AppError::Unavailable {
                entity: self.entity,
            })
    }
}

/// Parameters for a request against `entity`.
pub fn request_params(entity: EntityType, query: Option<&str>) -> RequestParams {
    RequestParams::from_query(entity.endpoint(), query)
}
