//! HTTP Surface
//!
//! Thin axum router over the catalogue entry points. Handlers only extract
//! the request, call [`handle_read`] / [`handle_write`] and map the outcome
//! to a status code; all semantics live in [`crate::catalog`].
//!
//! # Routes
//! - `GET /books`: list books (query-string filters, sort, pagination)
//! - `POST /books/add`, `POST /books`: add a book from a JSON body
//! - `GET /health`: ping the store

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{handle_read, handle_write};
use crate::engine::CatalogEngine;
use crate::error::BookshelfError;
use crate::output::{ErrorEnvelope, Metadata, SuccessEnvelope};

/// Build the router over a shared store handle
pub fn router<E>(store: Arc<E>) -> Router
where
    E: CatalogEngine + Send + Sync + 'static,
{
    Router::new()
        .route("/books", get(list_books::<E>).post(add_book::<E>))
        .route("/books/add", post(add_book::<E>))
        .route("/health", get(health::<E>))
        .with_state(store)
}

/// A failed request, rendered as an error envelope
struct ApiError {
    engine: String,
    command: &'static str,
    err: BookshelfError,
}

impl ApiError {
    fn new(engine: impl Into<String>, command: &'static str, err: BookshelfError) -> Self {
        Self {
            engine: engine.into(),
            command,
            err,
        }
    }
}

/// Client mistakes are 400; everything else is the server's problem
fn status_for(err: &BookshelfError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.err);
        if status.is_server_error() {
            tracing::error!(
                command = self.command,
                code = self.err.error_code(),
                error = %self.err,
                "request failed"
            );
        } else {
            tracing::debug!(command = self.command, error = %self.err, "rejected request");
        }
        let envelope = ErrorEnvelope::from_error(self.engine, self.command, &self.err);
        (status, Json(envelope)).into_response()
    }
}

async fn list_books<E>(
    State(store): State<Arc<E>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError>
where
    E: CatalogEngine + Send + Sync + 'static,
{
    let books = handle_read(store.as_ref(), params)
        .await
        .map_err(|err| ApiError::new(store.engine().as_str(), "list", err))?;
    Ok(Json(books).into_response())
}

async fn add_book<E>(State(store): State<Arc<E>>, body: Bytes) -> Result<StatusCode, ApiError>
where
    E: CatalogEngine + Send + Sync + 'static,
{
    handle_write(store.as_ref(), &body)
        .await
        .map_err(|err| ApiError::new(store.engine().as_str(), "add", err))?;
    Ok(StatusCode::CREATED)
}

async fn health<E>(State(store): State<Arc<E>>) -> Result<Response, ApiError>
where
    E: CatalogEngine + Send + Sync + 'static,
{
    let engine = store.engine();
    let start = Instant::now();
    store
        .ping()
        .await
        .map_err(|err| ApiError::new(engine.as_str(), "ping", err))?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let envelope = SuccessEnvelope::new(
        engine.as_str(),
        "ping",
        serde_json::json!({ "status": "ok" }),
        Metadata::new(elapsed_ms),
    );
    Ok(Json(envelope).into_response())
}
