//! `SQLite` Store Implementation
//!
//! This module implements [`CatalogEngine`] for `SQLite` database files.
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver); every call opens its own
//!   connection inside `tokio::task::spawn_blocking`
//! - Concurrent writers are serialized by `SQLite` itself; `busy_timeout`
//!   makes them wait instead of failing immediately
//! - Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text and normalized to
//!   RFC 3339 by the read query
//! - Requires `SQLite` 3.35+ for `RETURNING` (the bundled library qualifies)
//! - `:memory:` is rejected since nothing would survive between calls

use chrono::{DateTime, Utc};
use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{read, upsert};
use crate::engine::{CatalogEngine, ConnectionConfig, DatabaseType};
use crate::error::{BookshelfError, Result};
use crate::model::{Book, Category};
use crate::query::{compile, QuerySpec, SqlValue, Statement};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored timestamp layout, matching `CURRENT_TIMESTAMP`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Handle to a `SQLite` catalogue file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Validate the config and build a handle
    ///
    /// The file is not touched until the first call.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        config.expect_engine(DatabaseType::SQLite)?;

        let file_path = config
            .file
            .as_ref()
            .ok_or_else(|| BookshelfError::invalid_input("SQLite requires 'file' parameter"))?;

        if file_path.to_str().is_none() {
            return Err(BookshelfError::invalid_input(
                "SQLite file path contains invalid UTF-8 characters",
            ));
        }
        if file_path.as_os_str() == ":memory:" {
            return Err(BookshelfError::invalid_input(
                "SQLite store requires a database file, not ':memory:'",
            ));
        }

        Ok(Self {
            path: file_path.clone(),
        })
    }

    /// Database file behind this handle
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `work` against a fresh connection on the blocking pool
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path)?;
            work(&mut conn)
        })
        .await
        .map_err(|e| BookshelfError::engine_error("sqlite", format!("Blocking task failed: {e}")))?
    }
}

impl CatalogEngine for SqliteStore {
    fn engine(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn ping(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
                .map_err(|e| {
                    BookshelfError::connection_failed(format!("SQLite ping failed: {e}"))
                })?;
            Ok(())
        })
        .await
    }

    async fn fetch_books(&self, spec: &QuerySpec) -> Result<Vec<Book>> {
        let compiled = compile(spec, DatabaseType::SQLite);
        let statement = read::select_books(DatabaseType::SQLite, compiled);
        self.with_connection(move |conn| query_books(conn, &statement))
            .await
    }

    async fn save_book(&self, book: Book) -> Result<Book> {
        self.with_connection(move |conn| save_book_tx(conn, book))
            .await
    }
}

/// Open a read-write connection, creating the file if needed
fn open_connection(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;

    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        BookshelfError::connection_failed(format!("Failed to open SQLite database: {e}"))
    })?;

    conn.busy_timeout(BUSY_TIMEOUT).map_err(|e| {
        BookshelfError::engine_error("sqlite", format!("Failed to set timeout: {e}"))
    })?;
    conn.pragma_update(None, "foreign_keys", true).map_err(|e| {
        BookshelfError::engine_error("sqlite", format!("Failed to enable foreign keys: {e}"))
    })?;
    // `[has]` matches case-sensitively, as on Postgres
    conn.pragma_update(None, "case_sensitive_like", true).map_err(|e| {
        BookshelfError::engine_error("sqlite", format!("Failed to set LIKE case: {e}"))
    })?;

    Ok(conn)
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(v) => ToSqlOutput::from(v.as_str()),
            Self::Integer(v) => ToSqlOutput::from(*v),
            Self::Real(v) => ToSqlOutput::from(*v),
            Self::Timestamp(v) => ToSqlOutput::from(v.format(TIMESTAMP_FORMAT).to_string()),
        })
    }
}

fn query_books(conn: &Connection, statement: &Statement) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(statement.sql())
        .map_err(|e| BookshelfError::query_failed(format!("Failed to prepare read query: {e}")))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(statement.values()), |row| {
            Ok(RawBook {
                id: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                content: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
                categories: row.get(6)?,
            })
        })
        .map_err(|e| BookshelfError::query_failed(format!("Failed to execute read query: {e}")))?
        .collect::<std::result::Result<Vec<RawBook>, _>>()
        .map_err(|e| BookshelfError::query_failed(format!("Failed to fetch books: {e}")))?;

    rows.into_iter().map(RawBook::into_book).collect()
}

/// A read row before timestamp and aggregate decoding
struct RawBook {
    id: i64,
    title: String,
    author: String,
    content: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    categories: String,
}

impl RawBook {
    fn into_book(self) -> Result<Book> {
        let aggregated: serde_json::Value = serde_json::from_str(&self.categories)
            .map_err(|e| BookshelfError::query_failed(format!("Invalid categories: {e}")))?;

        Ok(Book {
            id: Some(self.id),
            title: self.title,
            author: self.author,
            content: self.content,
            created_at: parse_timestamp(self.created_at.as_deref())?,
            updated_at: parse_timestamp(self.updated_at.as_deref())?,
            categories: read::decode_categories(aggregated)?,
        })
    }
}

fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| BookshelfError::query_failed(format!("Invalid timestamp '{s}': {e}")))
    })
    .transpose()
}

/// Run the whole write in one transaction; any error rolls everything back
fn save_book_tx(conn: &mut Connection, mut book: Book) -> Result<Book> {
    let tx = conn.transaction().map_err(|e| {
        BookshelfError::transaction_failed(format!("Failed to begin transaction: {e}"))
    })?;

    match write_book(&tx, &mut book) {
        Ok(()) => {
            tx.commit().map_err(|e| {
                BookshelfError::transaction_failed(format!("Failed to commit transaction: {e}"))
            })?;
            tracing::debug!(book_id = book.id, "committed book write");
            Ok(book)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            tracing::debug!(error = %err, "rolled back book write");
            Err(err)
        }
    }
}

fn write_book(tx: &Transaction<'_>, book: &mut Book) -> Result<()> {
    let dialect = DatabaseType::SQLite;

    let inserted: Option<i64> = query_optional_id(tx, &upsert::insert_book(dialect, book))?;
    let book_id = match inserted {
        Some(id) => id,
        None => {
            tracing::debug!(title = %book.title, "book insert suppressed, reusing existing row");
            let existing = query_optional_id(tx, &upsert::find_book_id(dialect, book))?;
            existing
                .ok_or_else(|| BookshelfError::transaction_failed("Conflicting book not found"))?
        }
    };
    book.id = Some(book_id);

    let names = book.distinct_category_names();
    let resolved = match upsert::upsert_categories(dialect, &names) {
        Some(statement) => upsert_categories(tx, &statement)?,
        None => Vec::new(),
    };
    tracing::debug!(book_id, categories = resolved.len(), "resolved categories");

    upsert::rebind_categories(book, &resolved)?;

    if let Some(statement) = upsert::insert_associations(dialect, book_id, book)? {
        let params = rusqlite::params_from_iter(statement.values());
        let written = tx.execute(statement.sql(), params).map_err(|e| {
            BookshelfError::transaction_failed(format!("Failed to insert associations: {e}"))
        })?;
        tracing::debug!(book_id, written, "inserted associations");
    }

    Ok(())
}

fn query_optional_id(tx: &Transaction<'_>, statement: &Statement) -> Result<Option<i64>> {
    let params = rusqlite::params_from_iter(statement.values());
    tx.query_row(statement.sql(), params, |row| row.get(0))
        .optional()
        .map_err(|e| BookshelfError::transaction_failed(format!("Failed to write book: {e}")))
}

fn upsert_categories(tx: &Transaction<'_>, statement: &Statement) -> Result<Vec<Category>> {
    let mut stmt = tx.prepare(statement.sql()).map_err(|e| {
        BookshelfError::transaction_failed(format!("Failed to prepare category upsert: {e}"))
    })?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(statement.values()), |row| {
            Ok(Category {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                created_at: None,
            })
        })
        .map_err(|e| {
            BookshelfError::transaction_failed(format!("Failed to upsert categories: {e}"))
        })?
        .collect::<std::result::Result<Vec<Category>, _>>()
        .map_err(|e| {
            BookshelfError::transaction_failed(format!("Failed to read category ids: {e}"))
        })?;

    Ok(rows)
}
