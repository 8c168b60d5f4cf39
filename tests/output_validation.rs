//! Output Validation Tests
//!
//! Checks the JSON shapes clients see:
//! - Success and error envelopes carry exactly their documented fields
//! - Book listings serialize ids, timestamps and nested categories
//! - The HTTP router maps outcomes to status codes over a real store

#![cfg(feature = "sqlite")]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;

use bookshelf::engine::sqlite::SqliteStore;
use bookshelf::{
    handle_read, handle_write, http, BookshelfError, ConnectionConfig, ErrorEnvelope, Metadata,
    SuccessEnvelope,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_db() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_file =
        std::env::temp_dir().join(format!("bookshelf_output_{}_{id}.db", std::process::id()));
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

fn cleanup(path: &Path) {
    let _ = std::fs::remove_file(path);
}

fn keys(value: &serde_json::Value) -> Vec<&str> {
    let mut keys: Vec<&str> = value
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    keys
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn list_all(store: &SqliteStore) -> Vec<bookshelf::Book> {
    handle_read(store, Vec::<(String, String)>::new())
        .await
        .unwrap()
}

const BOOK_FIELDS: [&str; 7] = [
    "author",
    "categories",
    "content",
    "created_at",
    "id",
    "title",
    "updated_at",
];

const DUNE: &str = r#"{"title":"Dune","author":"Herbert","content":"...","categories":[{"category":{"name":"scifi"},"weight":0.9}]}"#;

// ============================================================================
// Envelope Structure Tests
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let envelope = SuccessEnvelope::new(
        "sqlite",
        "list",
        serde_json::json!([]),
        Metadata::with_rows(42, 0),
    );

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(keys(&json), vec!["command", "data", "engine", "meta", "ok"]);
    assert_eq!(
        json,
        serde_json::json!({
            "ok": true,
            "engine": "sqlite",
            "command": "list",
            "data": [],
            "meta": { "execution_ms": 42, "rows_returned": 0 }
        })
    );
}

#[test]
fn test_error_envelope_structure() {
    let err = BookshelfError::invalid_input("Malformed book body");
    let envelope = ErrorEnvelope::from_error("postgres", "add", &err);

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(keys(&json), vec!["command", "engine", "error", "ok"]);
    assert_eq!(keys(&json["error"]), vec!["code", "message"]);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[test]
fn test_metadata_omits_rows_when_absent() {
    let json = serde_json::to_value(Metadata::new(7)).unwrap();
    assert_eq!(keys(&json), vec!["execution_ms"]);
}

// ============================================================================
// Book Serialization Tests
// ============================================================================

#[tokio::test]
async fn test_listed_book_shape() {
    let path = create_test_db();
    let store = open_store(&path);
    handle_write(&store, DUNE.as_bytes()).await.unwrap();

    let books = list_all(&store).await;
    let json = serde_json::to_value(&books).unwrap();

    let book = &json[0];
    assert_eq!(keys(book), BOOK_FIELDS);
    assert_eq!(book["id"], 1);
    assert_eq!(book["content"], "...");
    assert!(book["created_at"].as_str().unwrap().ends_with('Z'));

    let link = &book["categories"][0];
    assert_eq!(keys(link), vec!["category", "id", "weight"]);
    assert_eq!(link["id"], 1);
    assert_eq!(link["weight"], 0.9);
    assert_eq!(link["category"]["name"], "scifi");
    assert_eq!(link["category"]["id"], 1);

    cleanup(&path);
}

#[tokio::test]
async fn test_book_without_categories_lists_empty_array() {
    let path = create_test_db();
    let store = open_store(&path);
    handle_write(&store, br#"{"title":"Emma","author":"Austen"}"#)
        .await
        .unwrap();

    let books = list_all(&store).await;
    let json = serde_json::to_value(&books).unwrap();
    assert_eq!(json[0]["categories"], serde_json::json!([]));

    cleanup(&path);
}

// ============================================================================
// HTTP Surface Tests
// ============================================================================

#[tokio::test]
async fn test_http_write_then_read() {
    let path = create_test_db();
    let app = http::router(Arc::new(open_store(&path)));

    let created = app
        .clone()
        .oneshot(
            Request::post("/books/add")
                .header("content-type", "application/json")
                .body(Body::from(DUNE))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let listed = app
        .oneshot(
            Request::get("/books?sort=title&order=desc&pageSize=5&pageNumber=0&weight%5Bgte%5D=0.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);

    let json = body_json(listed).await;
    assert!(json.is_array());
    assert_eq!(json[0]["title"], "Dune");
    assert_eq!(json[0]["categories"][0]["category"]["name"], "scifi");

    cleanup(&path);
}

#[tokio::test]
async fn test_http_hostile_query_is_ok() {
    let path = create_test_db();
    let app = http::router(Arc::new(open_store(&path)));

    let response = app
        .oneshot(
            Request::get("/books?sort=id%3B%20DROP%20TABLE%20book&pageSize=abc&bogus%5Beq%5D=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));

    cleanup(&path);
}

#[tokio::test]
async fn test_http_invalid_body_is_bad_request_envelope() {
    let path = create_test_db();
    let app = http::router(Arc::new(open_store(&path)));

    let request = Request::post("/books")
        .body(Body::from(r#"{"title":"Dune"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(keys(&json), vec!["command", "engine", "error", "ok"]);
    assert_eq!(json["engine"], "sqlite");
    assert_eq!(json["error"]["code"], "INVALID_INPUT");

    cleanup(&path);
}

#[tokio::test]
async fn test_http_store_failure_is_server_error_envelope() {
    let path = create_test_db();
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE book_category;").unwrap();
    }
    let app = http::router(Arc::new(open_store(&path)));

    let response = app
        .oneshot(Request::post("/books/add").body(Body::from(DUNE)).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "TRANSACTION_FAILED");

    cleanup(&path);
}

#[tokio::test]
async fn test_http_health() {
    let path = create_test_db();
    let app = http::router(Arc::new(open_store(&path)));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["command"], "ping");

    cleanup(&path);
}
