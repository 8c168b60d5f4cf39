//! Catalogue Entry Points
//!
//! [`handle_read`] and [`handle_write`] are the two operations exposed to
//! every outer surface (HTTP router, CLI). Both take the store handle
//! explicitly; neither keeps state between calls.
//!
//! - Reads parse untrusted parameters, compile them against the allow-list
//!   and hand the parsed query to the engine. Malformed parameters never
//!   fail a read.
//! - Writes decode and validate the body before any statement runs, then
//!   delegate to the engine's transactional upsert.

pub mod read;
pub mod upsert;

use std::time::Instant;

use crate::engine::CatalogEngine;
use crate::error::{BookshelfError, Result};
use crate::model::Book;
use crate::query::QuerySpec;

/// List books matching the given query-string pairs
pub async fn handle_read<E, K, V>(
    store: &E,
    params: impl IntoIterator<Item = (K, V)>,
) -> Result<Vec<Book>>
where
    E: CatalogEngine + ?Sized,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let start = Instant::now();
    let spec = QuerySpec::from_pairs(params);
    let books = store.fetch_books(&spec).await?;

    tracing::info!(
        engine = %store.engine(),
        rows = books.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "read books"
    );
    Ok(books)
}

/// Decode a JSON book from `body` and persist it with its categories
///
/// Returns the stored book with resolved identifiers.
pub async fn handle_write<E>(store: &E, body: &[u8]) -> Result<Book>
where
    E: CatalogEngine + ?Sized,
{
    let book = decode_book(body)?;
    validate_book(&book)?;

    let start = Instant::now();
    let saved = store.save_book(book).await?;

    tracing::info!(
        engine = %store.engine(),
        book_id = saved.id,
        categories = saved.categories.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "saved book"
    );
    Ok(saved)
}

/// Parse a write body
pub fn decode_book(body: &[u8]) -> Result<Book> {
    serde_json::from_slice(body)
        .map_err(|e| BookshelfError::invalid_input(format!("Malformed book body: {e}")))
}

/// Reject books the store could not meaningfully hold
pub fn validate_book(book: &Book) -> Result<()> {
    if book.title.trim().is_empty() {
        return Err(BookshelfError::invalid_input("Book title must not be empty"));
    }
    if book.author.trim().is_empty() {
        return Err(BookshelfError::invalid_input("Book author must not be empty"));
    }

    for link in &book.categories {
        if link.category.name.trim().is_empty() {
            return Err(BookshelfError::invalid_input("Category name must not be empty"));
        }
        if !link.weight.is_finite() {
            return Err(BookshelfError::invalid_input(format!(
                "Weight for category '{}' must be a finite number",
                link.category.name
            )));
        }
    }

    Ok(())
}
