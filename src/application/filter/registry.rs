//! Entity type to filter mapping, fixed at startup.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::types::EntityType;

use super::{ErrorReportFilter, Filter, InstallMetricsFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no filter registered for entity type `{entity}`")]
    Unregistered { entity: EntityType },
}

/// Maps entity type tags to the filter responsible for them.
///
/// Immutable after construction; share it behind an `Arc` or a plain
/// reference without further synchronization.
pub struct FilterRegistry {
    filters: HashMap<EntityType, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// Build a registry from explicit pairs. A later pair replaces an earlier
    /// one for the same tag.
    pub fn new(entries: impl IntoIterator<Item = (EntityType, Arc<dyn Filter>)>) -> Self {
        Self {
            filters: entries.into_iter().collect(),
        }
    }

    /// Registry with every filter the API ships.
    pub fn standard() -> Self {
        Self::new([
            (
                EntityType::ErrorReport,
                Arc::new(ErrorReportFilter) as Arc<dyn Filter>,
            ),
            (
                EntityType::InstallMetrics,
                Arc::new(InstallMetricsFilter) as Arc<dyn Filter>,
            ),
        ])
    }

    pub fn resolve(&self, entity: EntityType) -> Result<Arc<dyn Filter>, RegistryError> {
        self.filters
            .get(&entity)
            .cloned()
            .ok_or(RegistryError::Unregistered { entity })
    }

    /// Fail if any of `required` has no filter.
    pub fn verify(&self, required: &[EntityType]) -> Result<(), RegistryError> {
        required
            .iter()
            .try_for_each(|entity| self.resolve(*entity).map(|_| ()))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
