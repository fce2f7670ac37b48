use crate::application::params::ParameterSource;
use crate::application::statement::{QueryStatement, Table};
use crate::domain::types::EntityType;

use super::{Filter, FilterError, apply_identity};

pub(crate) const INSTALL_METRICS: Table = Table::new("install_metrics", "im");

/// Filter for install metrics, identified by their listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallMetricsFilter;

impl Filter for InstallMetricsFilter {
    fn entity_type(&self) -> EntityType {
        EntityType::InstallMetrics
    }

    fn table(&self) -> Table {
        INSTALL_METRICS
    }

    fn apply(
        &self,
        params: &dyn ParameterSource,
        is_root: bool,
        statement: &mut QueryStatement,
    ) -> Result<(), FilterError> {
        apply_identity(params, is_root, INSTALL_METRICS.column("listing_id"), statement)
    }

    fn sortable_columns(&self) -> &'static [&'static str] {
        &["total", "updated_at"]
    }
}
