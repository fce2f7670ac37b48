//! Per-entity filters turning request parameters into query statements.
//!
//! Each [`Filter`] recognizes a fixed set of parameter names for its entity
//! type and ignores everything else. Parameter values are converted to their
//! typed form before a [`Clause`] is built; a failed conversion aborts the
//! whole build with a [`FilterError`] and no statement is returned.
//!
//! `id` and `ids` compose: when both are present each adds its own clause and
//! the statement requires both to hold.

mod error_reports;
mod install_metrics;
mod registry;

pub use error_reports::ErrorReportFilter;
pub use install_metrics::InstallMetricsFilter;
pub use registry::{FilterRegistry, RegistryError};

use thiserror::Error;
use uuid::Uuid;

use crate::application::params::{ParameterSource, UrlParameterName};
use crate::application::statement::{
    Clause, Column, Pagination, QueryStatement, Sort, SortDirection, StatementBuilder, Table,
};
use crate::domain::types::EntityType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid value `{value}` for parameter `{parameter}`: expected {expected}")]
    InvalidValue {
        parameter: UrlParameterName,
        value: String,
        expected: &'static str,
    },
    #[error("cannot sort by `{column}`")]
    UnsortableColumn { column: String },
}

impl FilterError {
    fn invalid(parameter: UrlParameterName, value: &str, expected: &'static str) -> Self {
        Self::InvalidValue {
            parameter,
            value: value.to_string(),
            expected,
        }
    }
}

pub trait Filter: Send + Sync {
    /// Entity type this filter builds statements for.
    fn entity_type(&self) -> EntityType;

    fn table(&self) -> Table;

    /// Add the entity-specific clauses, in a fixed order.
    ///
    /// `is_root` is false when the statement resolves a nested reference to
    /// this entity; the request's own `id` must not restrict such a lookup.
    fn apply(
        &self,
        params: &dyn ParameterSource,
        is_root: bool,
        statement: &mut QueryStatement,
    ) -> Result<(), FilterError>;

    /// Columns accepted by the `sort` parameter.
    fn sortable_columns(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_statement(
        &self,
        builder: &dyn StatementBuilder,
        params: &dyn ParameterSource,
        is_root: bool,
    ) -> Result<QueryStatement, FilterError> {
        let mut statement = builder.build(self.table());
        self.apply(params, is_root, &mut statement)?;
        apply_sort(self.table(), self.sortable_columns(), params, &mut statement)?;
        apply_pagination(builder.max_page_size(), params, &mut statement)?;
        Ok(statement)
    }
}

/// Add the `id` (root only) and `ids` clauses against `key`.
pub(crate) fn apply_identity(
    params: &dyn ParameterSource,
    is_root: bool,
    key: Column,
    statement: &mut QueryStatement,
) -> Result<(), FilterError> {
    if is_root {
        if let Some(id) = params.first(UrlParameterName::Id.as_str()) {
            statement.add_clause(Clause::eq(key, parse_uuid(UrlParameterName::Id, id)?));
        }
    }

    let ids = params.all(UrlParameterName::Ids.as_str());
    if !ids.is_empty() {
        let ids = ids
            .iter()
            .map(|id| parse_uuid(UrlParameterName::Ids, id))
            .collect::<Result<Vec<_>, _>>()?;
        statement.add_clause(Clause::any_of(key, ids));
    }

    Ok(())
}

pub(crate) fn parse_uuid(parameter: UrlParameterName, value: &str) -> Result<Uuid, FilterError> {
    Uuid::parse_str(value.trim()).map_err(|_| FilterError::invalid(parameter, value, "a UUID"))
}

pub(crate) fn parse_bool(parameter: UrlParameterName, value: &str) -> Result<bool, FilterError> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(FilterError::invalid(parameter, value, "`true` or `false`")),
    }
}

fn parse_positive(parameter: UrlParameterName, value: &str) -> Result<u32, FilterError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|parsed| *parsed > 0)
        .ok_or_else(|| FilterError::invalid(parameter, value, "a positive integer"))
}

fn apply_sort(
    table: Table,
    sortable: &'static [&'static str],
    params: &dyn ParameterSource,
    statement: &mut QueryStatement,
) -> Result<(), FilterError> {
    let Some(raw) = params.first(UrlParameterName::Sort.as_str()) else {
        return Ok(());
    };

    let mut parts = raw
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|part| !part.is_empty());
    let requested = parts.next().unwrap_or_default();
    let direction = match parts.next() {
        None => SortDirection::Asc,
        Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
        Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
        Some(_) => {
            return Err(FilterError::invalid(
                UrlParameterName::Sort,
                raw,
                "`<column> [asc|desc]`",
            ));
        }
    };
    if parts.next().is_some() {
        return Err(FilterError::invalid(
            UrlParameterName::Sort,
            raw,
            "`<column> [asc|desc]`",
        ));
    }

    let column = sortable
        .iter()
        .find(|name| **name == requested)
        .ok_or_else(|| FilterError::UnsortableColumn {
            column: requested.to_string(),
        })?;

    statement.set_sort(Sort {
        column: table.column(*column),
        direction,
    });
    Ok(())
}

fn apply_pagination(
    max_page_size: u32,
    params: &dyn ParameterSource,
    statement: &mut QueryStatement,
) -> Result<(), FilterError> {
    let limit = params
        .first(UrlParameterName::Limit.as_str())
        .map(|value| parse_positive(UrlParameterName::Limit, value))
        .transpose()?;
    let page = params
        .first(UrlParameterName::Page.as_str())
        .map(|value| parse_positive(UrlParameterName::Page, value))
        .transpose()?;

    if limit.is_none() && page.is_none() {
        return Ok(());
    }

    let limit = limit
        .or_else(|| statement.pagination().map(|current| current.limit))
        .unwrap_or(max_page_size)
        .min(max_page_size);
    statement.set_pagination(Pagination::page(page.unwrap_or(1), limit));
    Ok(())
}
