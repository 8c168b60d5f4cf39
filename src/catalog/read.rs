//! Read Assembler statements
//!
//! One query per read: books left-joined to their associations and
//! categories, grouped by book, with the associations aggregated store-side
//! into a JSON array.

use crate::engine::DatabaseType;
use crate::error::{BookshelfError, Result};
use crate::model::BookCategory;
use crate::query::{CompiledQuery, Statement};

const POSTGRES_SELECT: &str = "SELECT b.id, b.title, b.author, b.content, \
b.created_at::timestamptz AS created_at, b.updated_at::timestamptz AS updated_at, \
COALESCE(json_agg(json_build_object(\
'id', c.id, \
'category', json_build_object('id', c.id, 'name', c.name, \
'created_at', c.created_at::timestamptz), \
'weight', bc.weight)) FILTER (WHERE c.id IS NOT NULL), '[]'::json) AS categories \
FROM book b \
LEFT JOIN book_category bc ON bc.book_id = b.id \
LEFT JOIN category c ON c.id = bc.category_id";

const SQLITE_SELECT: &str = "SELECT b.id, b.title, b.author, b.content, \
strftime('%Y-%m-%dT%H:%M:%SZ', b.created_at) AS created_at, \
strftime('%Y-%m-%dT%H:%M:%SZ', b.updated_at) AS updated_at, \
COALESCE(json_group_array(json_object(\
'id', c.id, \
'category', json_object('id', c.id, 'name', c.name, \
'created_at', strftime('%Y-%m-%dT%H:%M:%SZ', c.created_at)), \
'weight', bc.weight)) FILTER (WHERE c.id IS NOT NULL), '[]') AS categories \
FROM book b \
LEFT JOIN book_category bc ON bc.book_id = b.id \
LEFT JOIN category c ON c.id = bc.category_id";

const GROUP_BY: &str = " GROUP BY b.id, b.title, b.author, b.content, b.created_at, b.updated_at";

/// Assemble the full read statement from compiled fragments
///
/// Result columns: `id, title, author, content, created_at, updated_at, categories`.
#[must_use]
pub fn select_books(dialect: DatabaseType, compiled: CompiledQuery) -> Statement {
    let base = match dialect {
        DatabaseType::Postgres => POSTGRES_SELECT,
        DatabaseType::SQLite => SQLITE_SELECT,
    };

    let capacity = base.len()
        + compiled.where_clause.len()
        + GROUP_BY.len()
        + compiled.order_by.len()
        + compiled.pagination.len();
    let mut sql = String::with_capacity(capacity);
    sql.push_str(base);
    sql.push_str(&compiled.where_clause);
    sql.push_str(GROUP_BY);
    sql.push_str(&compiled.order_by);
    sql.push_str(&compiled.pagination);

    Statement::from_parts(dialect, sql, compiled.values)
}

/// Decode the aggregated `categories` column, ordered by category name
pub fn decode_categories(aggregated: serde_json::Value) -> Result<Vec<BookCategory>> {
    let mut categories: Vec<BookCategory> = serde_json::from_value(aggregated)
        .map_err(|e| BookshelfError::query_failed(format!("Failed to parse categories: {e}")))?;
    categories.sort_by(|a, b| a.category.name.cmp(&b.category.name));
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{compile, QuerySpec};

    #[test]
    fn test_select_books_places_fragments_in_order() {
        let spec = QuerySpec::from_pairs([("title[eq]", "Dune"), ("sort", "title")]);
        let compiled = compile(&spec, DatabaseType::Postgres);
        let stmt = select_books(DatabaseType::Postgres, compiled);
        let sql = stmt.sql();

        let where_at = sql.find(" WHERE b.title = $1").unwrap();
        let group_at = sql.find(" GROUP BY").unwrap();
        let order_at = sql.find(" ORDER BY b.title ASC").unwrap();
        let limit_at = sql.find(" LIMIT $2 OFFSET $3").unwrap();
        assert!(where_at < group_at && group_at < order_at && order_at < limit_at);
        assert_eq!(stmt.values().len(), 3);
    }

    #[test]
    fn test_base_queries_have_no_placeholders() {
        assert!(!POSTGRES_SELECT.contains('$'));
        assert!(!SQLITE_SELECT.contains('?'));
    }

    #[test]
    fn test_decode_categories_sorts_by_name() {
        let aggregated = serde_json::json!([
            {
                "id": 2,
                "category": {"id": 2, "name": "scifi", "created_at": "2024-01-01T00:00:00Z"},
                "weight": 0.9
            },
            {
                "id": 5,
                "category": {"id": 5, "name": "classic", "created_at": null},
                "weight": 0.4
            }
        ]);
        let categories = decode_categories(aggregated).unwrap();

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category.name, "classic");
        assert_eq!(categories[1].id, Some(2));
        assert!(categories[0].category.created_at.is_none());
    }

    #[test]
    fn test_decode_categories_rejects_malformed_json() {
        let err = decode_categories(serde_json::json!({"not": "an array"})).unwrap_err();
        assert_eq!(err.error_code(), "QUERY_FAILED");
    }

    #[test]
    fn test_decode_empty_aggregate() {
        assert!(decode_categories(serde_json::json!([])).unwrap().is_empty());
    }
}
