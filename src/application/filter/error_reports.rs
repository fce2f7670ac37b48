use crate::application::params::{ParameterSource, UrlParameterName};
use crate::application::statement::{Clause, QueryStatement, Table};
use crate::domain::types::EntityType;

use super::{Filter, FilterError, apply_identity, parse_bool, parse_uuid};

pub(crate) const ERROR_REPORTS: Table = Table::new("error_reports", "er");

/// Filter for error reports.
///
/// Recognizes `id`, `ids`, `listing_id`, `read` and `feature_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReportFilter;

impl Filter for ErrorReportFilter {
    fn entity_type(&self) -> EntityType {
        EntityType::ErrorReport
    }

    fn table(&self) -> Table {
        ERROR_REPORTS
    }

    fn apply(
        &self,
        params: &dyn ParameterSource,
        is_root: bool,
        statement: &mut QueryStatement,
    ) -> Result<(), FilterError> {
        apply_identity(params, is_root, ERROR_REPORTS.column("id"), statement)?;

        if let Some(listing_id) = params.first(UrlParameterName::ListingId.as_str()) {
            statement.add_clause(Clause::eq(
                ERROR_REPORTS.column("listing_id"),
                parse_uuid(UrlParameterName::ListingId, listing_id)?,
            ));
        }

        if let Some(read) = params.first(UrlParameterName::Read.as_str()) {
            statement.add_clause(Clause::eq(
                ERROR_REPORTS.column("is_read"),
                parse_bool(UrlParameterName::Read, read)?,
            ));
        }

        if let Some(feature_id) = params.first(UrlParameterName::FeatureId.as_str()) {
            statement.add_clause(Clause::contains(
                ERROR_REPORTS.column("feature_ids"),
                feature_id,
            ));
        }

        Ok(())
    }

    fn sortable_columns(&self) -> &'static [&'static str] {
        &["created_at", "title", "status_code"]
    }
}
