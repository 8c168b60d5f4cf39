//! Edge Case Tests
//!
//! Hostile and unusual inputs against a real `SQLite` store: injection
//! attempts through every parameter position, LIKE metacharacters and case,
//! malformed or extreme paging values, out-of-range identifiers, duplicate
//! categories in one body and non-ASCII text.

#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use bookshelf::engine::sqlite::SqliteStore;
use bookshelf::{handle_read, handle_write, Book, ConnectionConfig};

const TABLES: [&str; 3] = ["book", "book_category", "category"];

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_db() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_file =
        std::env::temp_dir().join(format!("bookshelf_edge_{}_{id}.db", std::process::id()));
    let _ = std::fs::remove_file(&temp_file);

    let conn = Connection::open(&temp_file).expect("Failed to create temp database");
    conn.execute_batch(
        "CREATE TABLE book (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (title, author)
        );
        CREATE TABLE category (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE book_category (
            id INTEGER PRIMARY KEY,
            book_id INTEGER NOT NULL REFERENCES book(id),
            category_id INTEGER NOT NULL REFERENCES category(id),
            weight REAL NOT NULL,
            UNIQUE (book_id, category_id)
        );",
    )
    .expect("Failed to create schema");

    temp_file
}

fn open_store(path: &Path) -> SqliteStore {
    SqliteStore::open(&ConnectionConfig::sqlite(path.to_path_buf())).expect("Failed to open store")
}

fn table_names(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

fn count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    let sql = format!("SELECT COUNT(*) FROM {table}");
    conn.query_row(&sql, [], |row| row.get(0)).unwrap()
}

fn cleanup(path: &Path) {
    let _ = std::fs::remove_file(path);
}

async fn write(store: &SqliteStore, title: &str, categories: &[(&str, f64)]) {
    let links: Vec<serde_json::Value> = categories
        .iter()
        .map(|(name, weight)| serde_json::json!({ "category": { "name": name }, "weight": weight }))
        .collect();
    let body = serde_json::json!({ "title": title, "author": "Author", "categories": links });
    handle_write(store, body.to_string().as_bytes())
        .await
        .expect("write failed");
}

async fn read(store: &SqliteStore, params: &[(&str, &str)]) -> Vec<Book> {
    handle_read(store, params.iter().copied())
        .await
        .expect("read failed")
}

fn titles(books: &[Book]) -> Vec<&str> {
    books.iter().map(|b| b.title.as_str()).collect()
}

// ============================================================================
// Injection Attempts
// ============================================================================

#[tokio::test]
async fn test_injection_in_sort_falls_back_to_default() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "B", &[]).await;
    write(&store, "A", &[]).await;

    let params = [("sort", "title; DROP TABLE book; --"), ("order", "desc")];
    let books = read(&store, &params).await;

    // Default column (id), requested direction
    assert_eq!(titles(&books), vec!["A", "B"]);
    assert_eq!(table_names(&path), TABLES);

    cleanup(&path);
}

#[tokio::test]
async fn test_injection_in_order_is_ascending() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "B", &[]).await;
    write(&store, "A", &[]).await;

    let params = [("sort", "title"), ("order", "desc; DELETE FROM book")];
    let books = read(&store, &params).await;

    assert_eq!(titles(&books), vec!["A", "B"]);
    assert_eq!(count(&path, "book"), 2);

    cleanup(&path);
}

#[tokio::test]
async fn test_injection_in_filter_value_is_bound() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "Dune", &[]).await;

    let books = read(&store, &[("title[eq]", "x' OR '1'='1")]).await;
    assert!(books.is_empty());

    let books = read(&store, &[("title[eq]", "Dune'; DROP TABLE book; --")]).await;
    assert!(books.is_empty());
    assert_eq!(count(&path, "book"), 1);

    cleanup(&path);
}

#[tokio::test]
async fn test_injection_in_filter_field_is_dropped() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "Dune", &[]).await;

    let params = [("1=1) OR (title[eq]", "x"), ("title; --[eq]", "x")];
    let books = read(&store, &params).await;

    assert_eq!(titles(&books), vec!["Dune"]);
    assert_eq!(table_names(&path), TABLES);

    cleanup(&path);
}

#[tokio::test]
async fn test_hostile_text_in_write_is_stored_verbatim() {
    let path = create_test_db();
    let store = open_store(&path);
    let title = "Robert'); DROP TABLE book; --";
    let category = "x'); DELETE FROM category; --";
    write(&store, title, &[(category, 1.0)]).await;

    let books = read(&store, &[("title[eq]", title)]).await;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].categories[0].category.name, category);
    assert_eq!(count(&path, "category"), 1);

    cleanup(&path);
}

// ============================================================================
// Parameter Coercion
// ============================================================================

#[tokio::test]
async fn test_malformed_page_size_uses_default() {
    let path = create_test_db();
    let store = open_store(&path);
    for i in 0..12 {
        write(&store, &format!("Book {i:02}"), &[]).await;
    }

    for raw in ["abc", "0", "-5", "", "1e3"] {
        let books = read(&store, &[("pageSize", raw)]).await;
        assert_eq!(books.len(), 10, "pageSize={raw:?}");
    }

    cleanup(&path);
}

#[tokio::test]
async fn test_negative_page_number_is_first_page() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[]).await;
    write(&store, "B", &[]).await;

    let books = read(&store, &[("pageSize", "1"), ("pageNumber", "-3")]).await;
    assert_eq!(titles(&books), vec!["A"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_largest_page_values_read_an_empty_page() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[("x", 1.0)]).await;

    let params = [("pageSize", "4294967295"), ("pageNumber", "4294967295")];
    let books = read(&store, &params).await;
    assert!(books.is_empty());

    let books = read(&store, &[("pageSize", "4294967295")]).await;
    assert_eq!(titles(&books), vec!["A"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_unparsable_numeric_filter_is_dropped() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[("x", 1.0)]).await;

    let books = read(&store, &[("weight[gt]", "heavy"), ("id[eq]", "one")]).await;
    assert_eq!(titles(&books), vec!["A"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_identifier_filter_outside_serial_range_is_dropped() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[("x", 1.0)]).await;
    write(&store, "B", &[("y", 1.0)]).await;

    let params = [("id[eq]", "99999999999"), ("book_id[gt]", "-2147483649")];
    let books = read(&store, &params).await;
    assert_eq!(titles(&books), vec!["A", "B"]);

    let books = read(&store, &[("id[eq]", "99999999999"), ("id[eq]", "2")]).await;
    assert_eq!(titles(&books), vec!["B"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_has_matches_like_metacharacters_literally() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "100% Done", &[]).await;
    write(&store, "1000 Done", &[]).await;
    write(&store, "snake_case", &[]).await;
    write(&store, "snakeXcase", &[]).await;

    let percent = read(&store, &[("title[has]", "100%")]).await;
    assert_eq!(titles(&percent), vec!["100% Done"]);

    let underscore = read(&store, &[("title[has]", "e_c")]).await;
    assert_eq!(titles(&underscore), vec!["snake_case"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_has_is_case_sensitive() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "Dune", &[("SciFi", 1.0)]).await;
    write(&store, "dune messiah", &[("scifi", 1.0)]).await;

    let lower = read(&store, &[("title[has]", "dune")]).await;
    assert_eq!(titles(&lower), vec!["dune messiah"]);

    let upper = read(&store, &[("title[has]", "Dune")]).await;
    assert_eq!(titles(&upper), vec!["Dune"]);

    let category = read(&store, &[("name[has]", "Sci")]).await;
    assert_eq!(titles(&category), vec!["Dune"]);

    cleanup(&path);
}

#[tokio::test]
async fn test_repeated_filter_keys_all_apply() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[("x", 1.0)]).await;
    write(&store, "B", &[("x", 5.0)]).await;
    write(&store, "C", &[("x", 9.0)]).await;

    let books = read(&store, &[("weight[gt]", "2"), ("weight[lt]", "8")]).await;
    assert_eq!(titles(&books), vec!["B"]);

    cleanup(&path);
}

// ============================================================================
// Write Bodies
// ============================================================================

#[tokio::test]
async fn test_duplicate_category_in_body_links_once() {
    let path = create_test_db();
    let store = open_store(&path);

    let saved = handle_write(
        &store,
        br#"{"title":"Dune","author":"Herbert","categories":[
            {"category":{"name":"scifi"},"weight":0.9},
            {"category":{"name":"scifi"},"weight":0.1}
        ]}"#,
    )
    .await
    .unwrap();

    assert_eq!(saved.categories.len(), 2);
    assert_eq!(count(&path, "category"), 1);
    assert_eq!(count(&path, "book_category"), 1);

    let books = read(&store, &[]).await;
    assert_eq!(books[0].categories.len(), 1);
    assert!((books[0].categories[0].weight - 0.9).abs() < 1e-9);

    cleanup(&path);
}

#[tokio::test]
async fn test_category_names_are_case_sensitive() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "Dune", &[("SciFi", 1.0), ("scifi", 2.0)]).await;

    assert_eq!(count(&path, "category"), 2);

    cleanup(&path);
}

#[tokio::test]
async fn test_body_order_does_not_change_category_ids() {
    let path = create_test_db();
    let store = open_store(&path);
    write(&store, "A", &[("zeta", 1.0), ("alpha", 1.0)]).await;
    write(&store, "B", &[("alpha", 1.0), ("zeta", 1.0)]).await;

    assert_eq!(count(&path, "category"), 2);
    assert_eq!(count(&path, "book_category"), 4);

    let books = read(&store, &[("name[eq]", "alpha")]).await;
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].categories[0].category.id, Some(1));
    assert_eq!(books[1].categories[0].category.id, Some(1));

    cleanup(&path);
}

#[tokio::test]
async fn test_client_supplied_ids_are_ignored() {
    let path = create_test_db();
    let store = open_store(&path);

    let saved = handle_write(
        &store,
        br#"{"id":999,"title":"Dune","author":"Herbert","categories":[{"id":777,"category":{"id":555,"name":"scifi"},"weight":1}]}"#,
    )
    .await
    .unwrap();

    assert_eq!(saved.id, Some(1));
    assert_eq!(saved.categories[0].category.id, Some(1));

    cleanup(&path);
}

#[tokio::test]
async fn test_blank_category_name_is_rejected() {
    let path = create_test_db();
    let store = open_store(&path);

    let err = handle_write(
        &store,
        br#"{"title":"Dune","author":"Herbert","categories":[{"category":{"name":"  "},"weight":1}]}"#,
    )
    .await
    .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_INPUT");
    assert_eq!(count(&path, "book"), 0);

    cleanup(&path);
}

#[tokio::test]
async fn test_unicode_round_trips() {
    let path = create_test_db();
    let store = open_store(&path);
    let categories = [("классика", 1.0), ("小説", 2.0)];
    write(&store, "Мастер и Маргарита", &categories).await;

    let books = read(&store, &[("title[has]", "Маргарита")]).await;
    assert_eq!(books.len(), 1);
    let names: Vec<&str> = books[0]
        .categories
        .iter()
        .map(|c| c.category.name.as_str())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"классика"));
    assert!(names.contains(&"小説"));

    cleanup(&path);
}

#[tokio::test]
async fn test_filter_on_category_name_restricts_listed_associations() {
    let path = create_test_db();
    let store = open_store(&path);
    let categories = [("scifi", 1.0), ("classic", 2.0), ("desert", 3.0)];
    write(&store, "Dune", &categories).await;

    let books = read(&store, &[("name[eq]", "classic")]).await;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].categories.len(), 1);
    assert_eq!(books[0].categories[0].category.name, "classic");

    cleanup(&path);
}
