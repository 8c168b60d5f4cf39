//! Parameterized statement builder
//!
//! A `Statement` owns the SQL text and the ordered list of values bound to
//! it. Placeholders are numbered from the value list itself, so the n-th
//! placeholder always refers to the n-th value regardless of how many rows
//! or filters were appended.

use chrono::{DateTime, Utc};

use crate::engine::DatabaseType;

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// SQL text plus its bound values
#[derive(Debug, Clone)]
pub struct Statement {
    dialect: DatabaseType,
    sql: String,
    values: Vec<SqlValue>,
}

impl Statement {
    /// Start an empty statement for the given dialect
    #[must_use]
    pub const fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            sql: String::new(),
            values: Vec::new(),
        }
    }

    /// Start a statement with fixed leading SQL
    pub fn with_sql(dialect: DatabaseType, sql: &str) -> Self {
        let mut stmt = Self::new(dialect);
        stmt.push_sql(sql);
        stmt
    }

    /// Reassemble a statement from SQL already numbered against `values`
    pub(crate) fn from_parts(dialect: DatabaseType, sql: String, values: Vec<SqlValue>) -> Self {
        Self { dialect, sql, values }
    }

    /// Append trusted SQL text (never client input)
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Record a value and return the placeholder that refers to it
    ///
    /// The placeholder is not appended to the SQL text; use this when the
    /// fragment is assembled elsewhere.
    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        self.dialect.placeholder(self.values.len())
    }

    /// Record a value and append its placeholder to the SQL text
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        let placeholder = self.bind(value);
        self.sql.push_str(&placeholder);
        self
    }

    /// Append `(p1, p2, ...), (pn, ...)` for each row
    ///
    /// Returns the number of rows written. Callers must not emit a `VALUES`
    /// keyword for an empty row set.
    pub fn push_rows<R>(&mut self, rows: impl IntoIterator<Item = R>) -> usize
    where
        R: IntoIterator<Item = SqlValue>,
    {
        let mut count = 0;
        for row in rows {
            if count > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push('(');
            for (idx, value) in row.into_iter().enumerate() {
                if idx > 0 {
                    self.sql.push_str(", ");
                }
                self.push_bind(value);
            }
            self.sql.push(')');
            count += 1;
        }
        count
    }

    #[must_use]
    pub const fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// Build `INSERT INTO <table> (<columns>) VALUES (...), (...)`
///
/// Returns `None` for an empty row set so no invalid statement is ever issued.
/// `table` and `columns` are fixed identifiers from this crate, never client input.
pub fn multi_row_insert(
    dialect: DatabaseType,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<SqlValue>>,
) -> Option<Statement> {
    if rows.is_empty() {
        return None;
    }

    let mut stmt = Statement::new(dialect);
    stmt.push_sql(&format!("INSERT INTO {table} ({}) VALUES ", columns.join(", ")));
    stmt.push_rows(rows);
    Some(stmt)
}
