//! Store Engine Traits and Core Types
//!
//! This module defines the seam between the catalogue core and the
//! relational stores. Each engine (`PostgreSQL`, `SQLite`) implements
//! [`CatalogEngine`] over an explicitly constructed handle.
//!
//! # Handle Ownership
//! A store handle is opened once at startup, passed by reference into every
//! request, and dropped at shutdown. There is no process-wide connection.
//!
//! # Engine Isolation
//! Engines share the statement builders in [`crate::catalog`] and
//! [`crate::query`] but each owns its driver code: parameter binding, row
//! decoding and transaction handling.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;

use crate::error::{BookshelfError, Result};
use crate::model::Book;
use crate::query::QuerySpec;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Supported store engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::SQLite => "sqlite",
        }
    }

    /// Positional placeholder for the 1-based parameter `index`
    #[must_use]
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::SQLite => format!("?{index}"),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection configuration for store engines
///
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Store engine type
    pub engine: DatabaseType,

    /// Hostname (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (for postgres)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
        }
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: Some(file),
        }
    }

    /// Fail unless this config targets `expected`
    pub fn expect_engine(&self, expected: DatabaseType) -> Result<()> {
        if self.engine == expected {
            Ok(())
        } else {
            Err(BookshelfError::invalid_input(format!(
                "Expected {expected} engine, got {}",
                self.engine
            )))
        }
    }
}

/// Catalogue operations every store engine provides
///
/// Implementations must run [`CatalogEngine::save_book`] as one transaction
/// and must not return partial results from [`CatalogEngine::fetch_books`].
pub trait CatalogEngine {
    /// Engine behind this handle
    fn engine(&self) -> DatabaseType;

    /// Check that the store is reachable
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Run a compiled read and assemble books with their categories
    fn fetch_books(&self, spec: &QuerySpec) -> impl Future<Output = Result<Vec<Book>>> + Send;

    /// Persist a book, its categories and its associations atomically
    ///
    /// Returns the book with every identifier resolved.
    fn save_book(&self, book: Book) -> impl Future<Output = Result<Book>> + Send;
}

/// A store handle for whichever engine the configuration names
#[derive(Clone)]
pub enum Store {
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresStore),
    #[cfg(feature = "sqlite")]
    SQLite(sqlite::SqliteStore),
}

impl Store {
    /// Open a store handle from a resolved connection config
    ///
    /// `pool_size` only applies to pooled engines.
    pub fn open(config: &ConnectionConfig, pool_size: usize) -> Result<Self> {
        match config.engine {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => {
                Ok(Self::Postgres(postgres::PostgresStore::connect(config, pool_size)?))
            }
            #[cfg(feature = "sqlite")]
            DatabaseType::SQLite => {
                let _ = pool_size;
                Ok(Self::SQLite(sqlite::SqliteStore::open(config)?))
            }
            #[allow(unreachable_patterns)]
            other => Err(BookshelfError::config_error(format!(
                "Engine '{other}' is not enabled in this build"
            ))),
        }
    }
}

impl CatalogEngine for Store {
    fn engine(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.engine(),
            #[cfg(feature = "sqlite")]
            Self::SQLite(store) => store.engine(),
        }
    }

    async fn ping(&self) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.ping().await,
            #[cfg(feature = "sqlite")]
            Self::SQLite(store) => store.ping().await,
        }
    }

    async fn fetch_books(&self, spec: &QuerySpec) -> Result<Vec<Book>> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.fetch_books(spec).await,
            #[cfg(feature = "sqlite")]
            Self::SQLite(store) => store.fetch_books(spec).await,
        }
    }

    async fn save_book(&self, book: Book) -> Result<Book> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.save_book(book).await,
            #[cfg(feature = "sqlite")]
            Self::SQLite(store) => store.save_book(book).await,
        }
    }
}
