//! Bookshelf - book and category catalogue service
//!
//! Bookshelf stores books and globally shared, name-unique categories linked
//! by weighted associations, and exposes two operations over them: a
//! filtered, sorted, paginated read and a transactional write.
//!
//! # Core Principles
//! - No client string reaches SQL text unless it matched the allow-list
//! - Every value is a bound parameter
//! - Malformed read parameters degrade to defaults, never to errors
//! - A write either fully commits or leaves the store untouched
//!
//! # Architecture
//! The HTTP router and the CLI are thin wrappers around the same two
//! library functions, [`handle_read`] and [`handle_write`], which take an
//! explicit store handle.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`model`] - Books, categories and associations
//! - [`query`] - Parameter parsing, allow-list and predicate compilation
//! - [`catalog`] - Entry points, upsert and read assembly
//! - [`engine`] - Store trait and engine implementations
//! - [`config`] - Configuration management
//! - [`logging`] - Subscriber initialization
//! - [`http`] - axum router

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod model;
pub mod output;
pub mod query;

// Re-export commonly used types for convenience
pub use catalog::{handle_read, handle_write};
pub use config::{BookshelfConfig, ConnectionOverrides, ServerConfig, StoredConnection};
pub use engine::{CatalogEngine, ConnectionConfig, DatabaseType, Store};
pub use error::{BookshelfError, Result};
pub use model::{Book, BookCategory, Category};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use query::QuerySpec;
