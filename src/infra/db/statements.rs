use async_trait::async_trait;
use sqlx::{FromRow, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{RepoError, StatementExecutor};
use crate::application::statement::{Clause, Operator, QueryStatement, SqlValue};
use crate::domain::entities::{ErrorReportRecord, InstallMetricsRecord};

use super::{PostgresRepositories, map_sqlx_error};

const ERROR_REPORT_COLUMNS: &[&str] = &[
    "id",
    "listing_id",
    "title",
    "body",
    "status_code",
    "status_message",
    "detailed_message",
    "feature_ids",
    "is_read",
    "created_at",
];
const ERROR_REPORT_ORDER: &str = "created_at DESC, id";

const INSTALL_METRICS_COLUMNS: &[&str] = &["listing_id", "total", "last_30_days", "updated_at"];
const INSTALL_METRICS_ORDER: &str = "listing_id";

#[derive(Debug, FromRow)]
struct ErrorReportRow {
    id: Uuid,
    listing_id: Uuid,
    title: String,
    body: String,
    status_code: i32,
    status_message: String,
    detailed_message: Option<String>,
    feature_ids: Vec<String>,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl From<ErrorReportRow> for ErrorReportRecord {
    fn from(row: ErrorReportRow) -> Self {
        Self {
            id: row.id,
            listing_id: row.listing_id,
            title: row.title,
            body: row.body,
            status_code: row.status_code,
            status_message: row.status_message,
            detailed_message: row.detailed_message,
            feature_ids: row.feature_ids,
            read: row.is_read,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InstallMetricsRow {
    listing_id: Uuid,
    total: i64,
    last_30_days: i64,
    updated_at: OffsetDateTime,
}

impl From<InstallMetricsRow> for InstallMetricsRecord {
    fn from(row: InstallMetricsRow) -> Self {
        Self {
            listing_id: row.listing_id,
            total: row.total,
            last_30_days: row.last_30_days,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl StatementExecutor<ErrorReportRecord> for PostgresRepositories {
    async fn execute(
        &self,
        statement: &QueryStatement,
    ) -> Result<Vec<ErrorReportRecord>, RepoError> {
        let mut qb = select(statement, ERROR_REPORT_COLUMNS, ERROR_REPORT_ORDER);
        let rows = qb
            .build_query_as::<ErrorReportRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ErrorReportRecord::from).collect())
    }
}

#[async_trait]
impl StatementExecutor<InstallMetricsRecord> for PostgresRepositories {
    async fn execute(
        &self,
        statement: &QueryStatement,
    ) -> Result<Vec<InstallMetricsRecord>, RepoError> {
        let mut qb = select(statement, INSTALL_METRICS_COLUMNS, INSTALL_METRICS_ORDER);
        let rows = qb
            .build_query_as::<InstallMetricsRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(InstallMetricsRecord::from).collect())
    }
}

/// Render `statement` as a `SELECT` over `columns`, ordering by
/// `default_order` when the statement carries no sort of its own.
fn select(
    statement: &QueryStatement,
    columns: &[&str],
    default_order: &str,
) -> QueryBuilder<'static, Postgres> {
    let table = statement.table();
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");

    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            qb.push(", ");
        }
        qb.push(format_args!("{}.{column}", table.alias));
    }

    qb.push(format_args!(" FROM {} {} WHERE 1=1", table.name, table.alias));
    for clause in statement.clauses() {
        qb.push(" AND ");
        push_clause(&mut qb, clause);
    }

    match statement.sort() {
        Some(sort) => {
            qb.push(format_args!(
                " ORDER BY {} {}",
                sort.column,
                sort.direction.as_sql()
            ));
        }
        None => {
            qb.push(" ORDER BY ");
            for (index, term) in default_order.split(", ").enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                qb.push(format_args!("{}.{term}", table.alias));
            }
        }
    }

    if let Some(page) = statement.pagination() {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));
    }

    debug!(sql = qb.sql(), "rendered statement");
    qb
}

fn push_clause(qb: &mut QueryBuilder<'static, Postgres>, clause: &Clause) {
    match clause.op() {
        Operator::Eq => {
            qb.push(format_args!("{} = ", clause.column()));
            push_value(qb, clause.value());
        }
        Operator::AnyOf => {
            qb.push(format_args!("{} = ANY(", clause.column()));
            push_value(qb, clause.value());
            qb.push(")");
        }
        Operator::Contains => {
            push_value(qb, clause.value());
            qb.push(format_args!(" = ANY({})", clause.column()));
        }
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Uuid(id) => qb.push_bind(*id),
        SqlValue::UuidArray(ids) => qb.push_bind(ids.clone()),
        SqlValue::Bool(flag) => qb.push_bind(*flag),
        SqlValue::Text(text) => qb.push_bind(text.clone()),
    };
}
