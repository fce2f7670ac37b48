//! Parameterized query statements produced by filters.
//!
//! A [`QueryStatement`] names its source table and carries an ordered list of
//! [`Clause`]s plus optional sort and pagination directives. Statements hold
//! converted, typed values only; rendering into SQL with bind parameters is
//! left to the storage adapter.

use std::fmt;

use uuid::Uuid;

/// Source table of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub alias: &'static str,
}

impl Table {
    pub const fn new(name: &'static str, alias: &'static str) -> Self {
        Self { name, alias }
    }

    pub const fn column(&self, name: &'static str) -> Column {
        Column {
            table_alias: self.alias,
            name,
        }
    }
}

/// Alias-qualified column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub table_alias: &'static str,
    pub name: &'static str,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_alias, self.name)
    }
}

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Bool(bool),
    Text(String),
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Comparison applied by a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `column = $n`
    Eq,
    /// `column = ANY($n)`, the bound value is an array.
    AnyOf,
    /// `$n = ANY(column)`, the column is an array.
    Contains,
}

/// A predicate on one column with its bound value.
///
/// Constructors fix the value shape for each operator, so a clause always
/// carries exactly the values its predicate expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    column: Column,
    op: Operator,
    value: SqlValue,
}

impl Clause {
    pub fn eq(column: Column, value: impl Into<SqlValue>) -> Self {
        Self {
            column,
            op: Operator::Eq,
            value: value.into(),
        }
    }

    pub fn any_of(column: Column, values: Vec<Uuid>) -> Self {
        Self {
            column,
            op: Operator::AnyOf,
            value: SqlValue::UuidArray(values),
        }
    }

    pub fn contains(column: Column, value: impl Into<SqlValue>) -> Self {
        Self {
            column,
            op: Operator::Contains,
            value: value.into(),
        }
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    /// Predicate text with `placeholder` standing in for the bound value.
    pub fn predicate_with(&self, placeholder: &str) -> String {
        match self.op {
            Operator::Eq => format!("{} = {placeholder}", self.column),
            Operator::AnyOf => format!("{} = ANY({placeholder})", self.column),
            Operator::Contains => format!("{placeholder} = ANY({})", self.column),
        }
    }

    /// Predicate text with a `?` placeholder.
    pub fn predicate(&self) -> String {
        self.predicate_with("?")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: Column,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    /// Pagination for a 1-based page number.
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            limit,
            offset: u64::from(page.saturating_sub(1)) * u64::from(limit),
        }
    }
}

/// Ordered set of clauses bound to a source table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatement {
    table: Table,
    clauses: Vec<Clause>,
    sort: Option<Sort>,
    pagination: Option<Pagination>,
}

impl QueryStatement {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            clauses: Vec::new(),
            sort: None,
            pagination: None,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn add_clause(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = Some(sort);
    }

    pub fn sort(&self) -> Option<Sort> {
        self.sort
    }

    pub fn set_pagination(&mut self, pagination: Pagination) {
        self.pagination = Some(pagination);
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }
}

impl fmt::Display for QueryStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FROM {} {}", self.table.name, self.table.alias)?;
        for (index, clause) in self.clauses.iter().enumerate() {
            let keyword = if index == 0 { "WHERE" } else { "AND" };
            let placeholder = format!("${}", index + 1);
            write!(f, " {keyword} {}", clause.predicate_with(&placeholder))?;
        }
        if let Some(sort) = self.sort {
            write!(f, " ORDER BY {} {}", sort.column, sort.direction.as_sql())?;
        }
        if let Some(page) = self.pagination {
            write!(f, " LIMIT {} OFFSET {}", page.limit, page.offset)?;
        }
        Ok(())
    }
}

/// Produces empty statements for filters to populate.
pub trait StatementBuilder: Send + Sync {
    fn build(&self, table: Table) -> QueryStatement;

    /// Upper bound on a caller-requested page size.
    fn max_page_size(&self) -> u32;
}

/// Builder applying an implicit first page to every statement.
#[derive(Debug, Clone, Copy)]
pub struct PagedStatementBuilder {
    default_page_size: u32,
    max_page_size: u32,
}

impl PagedStatementBuilder {
    pub fn new(default_page_size: u32, max_page_size: u32) -> Self {
        Self {
            default_page_size,
            max_page_size: max_page_size.max(default_page_size),
        }
    }
}

impl StatementBuilder for PagedStatementBuilder {
    fn build(&self, table: Table) -> QueryStatement {
        let mut statement = QueryStatement::new(table);
        statement.set_pagination(Pagination::page(1, self.default_page_size));
        statement
    }

    fn max_page_size(&self) -> u32 {
        self.max_page_size
    }
}
