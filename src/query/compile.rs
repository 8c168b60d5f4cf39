//! Predicate Compiler
//!
//! Compiles a [`QuerySpec`] into WHERE, ORDER BY and LIMIT/OFFSET fragments.
//! Identifiers come only from the allow-list and operators only from
//! [`FilterOperator`]; every value, including the page bounds, is a bound
//! parameter.

use chrono::{DateTime, NaiveDate, Utc};

use super::allowlist::{self, ColumnKind};
use super::statement::{SqlValue, Statement};
use super::{Filter, FilterOperator, QuerySpec, Sort};
use crate::engine::DatabaseType;

/// SQL fragments and the values their placeholders refer to
///
/// Fragments are meant to be appended, in field order, to a base query that
/// has no placeholders of its own.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// ` WHERE ...`, or empty when no filter survived validation
    pub where_clause: String,

    /// ` ORDER BY <column> <ASC|DESC>`
    pub order_by: String,

    /// ` LIMIT <p> OFFSET <p>`
    pub pagination: String,

    pub values: Vec<SqlValue>,
}

/// Compile a spec for the given dialect
#[must_use]
pub fn compile(spec: &QuerySpec, dialect: DatabaseType) -> CompiledQuery {
    let mut stmt = Statement::new(dialect);

    let where_clause = compile_filters(&spec.filters, &mut stmt);
    let order_by = compile_order_by(&spec.sort);
    let limit = stmt.bind(i64::from(spec.page_size));
    let offset = stmt.bind(spec.offset());
    let pagination = format!(" LIMIT {limit} OFFSET {offset}");

    tracing::debug!(%where_clause, %order_by, %pagination, "compiled read query");

    CompiledQuery {
        where_clause,
        order_by,
        pagination,
        values: stmt.into_values(),
    }
}

/// Build the WHERE fragment, dropping filters that fail validation
fn compile_filters(filters: &[Filter], stmt: &mut Statement) -> String {
    let mut predicates = Vec::with_capacity(filters.len());

    for filter in filters {
        let Some(column) = allowlist::is_allowed(&filter.field) else {
            tracing::debug!(field = %filter.field, "dropping filter on unknown field");
            continue;
        };
        let Some(value) = coerce(column.kind, filter.operator, &filter.value) else {
            tracing::debug!(field = %filter.field, "dropping filter with unusable value");
            continue;
        };

        let placeholder = stmt.bind(value);
        let predicate = match filter.operator {
            FilterOperator::Has => format!("{} LIKE {placeholder} ESCAPE '\\'", column.column),
            op => format!("{} {} {placeholder}", column.column, op.as_sql()),
        };
        predicates.push(predicate);
    }

    if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    }
}

/// Build the ORDER BY fragment
///
/// Unknown or non-sortable fields fall back to the default sort column.
#[must_use]
pub fn compile_order_by(sort: &Sort) -> String {
    let column = allowlist::sortable(&sort.field)
        .or_else(|| allowlist::sortable(allowlist::DEFAULT_SORT_FIELD))
        .map_or("b.id", |c| c.column);

    format!(" ORDER BY {column} {}", sort.order.as_sql())
}

/// Convert a filter value into a typed parameter for its column
fn coerce(kind: ColumnKind, operator: FilterOperator, raw: &str) -> Option<SqlValue> {
    if operator == FilterOperator::Has {
        return (kind == ColumnKind::Text)
            .then(|| SqlValue::Text(raw.to_string()));
    }

    match kind {
        ColumnKind::Text => Some(SqlValue::Text(raw.to_string())),
        // Out-of-range ids could never match and would fail to bind as INT4
        ColumnKind::Serial => raw
            .trim()
            .parse::<i32>()
            .ok()
            .map(|v| SqlValue::Integer(i64::from(v))),
        ColumnKind::Real => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(SqlValue::Real),
        ColumnKind::Timestamp => parse_timestamp(raw.trim()).map(SqlValue::Timestamp),
    }
}

/// Accept RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
