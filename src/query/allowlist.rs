//! Allow-list Registry
//!
//! The fixed mapping from client-facing field names to the qualified
//! columns of the read query (`b` = book, `bc` = book_category,
//! `c` = category). Nothing derived from a request reaches SQL as an
//! identifier without passing through [`is_allowed`].

/// How a filter value is coerced before it is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Store-assigned identifier, limited to the 32-bit `SERIAL` range
    Serial,
    Real,
    Timestamp,
}

/// An allow-listed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Name accepted in query strings
    pub field: &'static str,

    /// Qualified identifier emitted into SQL
    pub column: &'static str,

    pub kind: ColumnKind,

    /// Only book columns can order a query that groups by book
    pub sortable: bool,
}

const fn column(
    field: &'static str,
    column: &'static str,
    kind: ColumnKind,
    sortable: bool,
) -> Column {
    Column { field, column, kind, sortable }
}

static COLUMNS: [Column; 10] = [
    // book
    column("id", "b.id", ColumnKind::Serial, true),
    column("title", "b.title", ColumnKind::Text, true),
    column("author", "b.author", ColumnKind::Text, true),
    column("content", "b.content", ColumnKind::Text, true),
    column("created_at", "b.created_at", ColumnKind::Timestamp, true),
    column("updated_at", "b.updated_at", ColumnKind::Timestamp, true),
    // category
    column("name", "c.name", ColumnKind::Text, false),
    // book_category
    column("book_id", "bc.book_id", ColumnKind::Serial, false),
    column("category_id", "bc.category_id", ColumnKind::Serial, false),
    column("weight", "bc.weight", ColumnKind::Real, false),
];

/// Field used when the requested sort field is missing or not sortable
pub const DEFAULT_SORT_FIELD: &str = "id";

/// Look up a client-facing field name
///
/// Matching is exact and case-sensitive.
#[must_use]
pub fn is_allowed(field: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.field == field)
}

/// Look up a field that may appear in ORDER BY
#[must_use]
pub fn sortable(field: &str) -> Option<&'static Column> {
    is_allowed(field).filter(|c| c.sortable)
}

/// Every allow-listed column
#[must_use]
pub fn columns() -> &'static [Column] {
    &COLUMNS
}
