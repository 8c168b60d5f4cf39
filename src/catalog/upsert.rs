//! Entity Upsert statements
//!
//! Statement builders for each step of the book write, plus the re-bind of
//! resolved category identifiers. Engines run these inside one transaction:
//!
//! 1. [`insert_book`], falling back to [`find_book_id`] when the insert is
//!    suppressed by a conflict
//! 2. [`upsert_categories`] for every distinct category name
//! 3. [`rebind_categories`] onto the in-memory book
//! 4. [`insert_associations`]
//!
//! Steps 2 and 4 return `None` for a book without categories so no empty
//! `VALUES` list is ever issued.

use crate::engine::DatabaseType;
use crate::error::{BookshelfError, Result};
use crate::model::{Book, Category};
use crate::query::statement::{multi_row_insert, SqlValue, Statement};

const ASSOCIATION_COLUMNS: [&str; 3] = ["book_id", "category_id", "weight"];

/// Insert the book's scalar attributes, returning `id` unless suppressed
#[must_use]
pub fn insert_book(dialect: DatabaseType, book: &Book) -> Statement {
    let mut stmt = Statement::with_sql(
        dialect,
        "INSERT INTO book (title, author, content) VALUES (",
    );
    stmt.push_bind(book.title.as_str())
        .push_sql(", ")
        .push_bind(book.author.as_str())
        .push_sql(", ")
        .push_bind(book.content.as_str())
        .push_sql(") ON CONFLICT DO NOTHING RETURNING id");
    stmt
}

/// Look up the row that suppressed [`insert_book`]
#[must_use]
pub fn find_book_id(dialect: DatabaseType, book: &Book) -> Statement {
    let mut stmt = Statement::with_sql(dialect, "SELECT id FROM book WHERE title = ");
    stmt.push_bind(book.title.as_str())
        .push_sql(" AND author = ")
        .push_bind(book.author.as_str())
        .push_sql(" ORDER BY id LIMIT 1");
    stmt
}

/// Insert-or-reuse categories by name, returning `id, name` for every row
///
/// The no-op update makes conflicting rows visible to `RETURNING`.
/// `names` must already be distinct and sorted, see
/// [`Book::distinct_category_names`].
#[must_use]
pub fn upsert_categories(dialect: DatabaseType, names: &[&str]) -> Option<Statement> {
    let rows = names
        .iter()
        .map(|name| vec![SqlValue::from(*name)])
        .collect();
    let mut stmt = multi_row_insert(dialect, "category", &["name"], rows)?;
    stmt.push_sql(" ON CONFLICT (name) DO UPDATE SET name = excluded.name RETURNING id, name");
    Some(stmt)
}

/// Substitute resolved category ids into the book's associations
///
/// Matching is by exact name. A name without a resolved row is an error.
pub fn rebind_categories(book: &mut Book, resolved: &[Category]) -> Result<()> {
    for link in &mut book.categories {
        let found = resolved
            .iter()
            .find(|c| c.name == link.category.name)
            .ok_or_else(|| {
                BookshelfError::transaction_failed(format!(
                    "Category '{}' was not returned by the upsert",
                    link.category.name
                ))
            })?;
        link.category.id = found.id;
        link.id = found.id;
        if found.created_at.is_some() {
            link.category.created_at = found.created_at;
        }
    }
    Ok(())
}

/// Insert one `book_category` row per distinct category, skipping existing pairs
///
/// Every association must already carry a resolved category id. When a
/// category appears more than once, the first weight wins. Rows are ordered
/// by category id.
pub fn insert_associations(
    dialect: DatabaseType,
    book_id: i64,
    book: &Book,
) -> Result<Option<Statement>> {
    let mut seen: Vec<i64> = Vec::with_capacity(book.categories.len());
    let mut rows = Vec::with_capacity(book.categories.len());

    for link in &book.categories {
        let category_id = link.category.id.ok_or_else(|| {
            BookshelfError::transaction_failed(format!(
                "Category '{}' has no resolved id",
                link.category.name
            ))
        })?;
        if seen.contains(&category_id) {
            continue;
        }
        seen.push(category_id);
        rows.push((category_id, link.weight));
    }
    rows.sort_by_key(|(category_id, _)| *category_id);

    let rows = rows
        .into_iter()
        .map(|(category_id, weight)| {
            vec![
                SqlValue::Integer(book_id),
                SqlValue::Integer(category_id),
                SqlValue::Real(weight),
            ]
        })
        .collect();

    let Some(mut stmt) =
        multi_row_insert(dialect, "book_category", &ASSOCIATION_COLUMNS, rows)
    else {
        return Ok(None);
    };
    stmt.push_sql(" ON CONFLICT DO NOTHING");
    Ok(Some(stmt))
}
