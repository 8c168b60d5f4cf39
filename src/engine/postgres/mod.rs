//! `PostgreSQL` Store Implementation
//!
//! This module implements [`CatalogEngine`] for `PostgreSQL` databases.
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` behind a `deadpool-postgres` pool; the pool is
//!   built once from the resolved connection config and cloned cheaply
//! - Statements are prepared first so every [`SqlValue`] can be converted to
//!   the exact parameter type the server inferred (`INT4` vs `INT8`,
//!   `FLOAT4` vs `FLOAT8`, `TIMESTAMP` vs `TIMESTAMPTZ`)
//! - Writes run in one explicit transaction, rolled back on any error
//! - Connection errors are never logged with credentials

use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{GenericClient, NoTls, Row};

use crate::catalog::{read, upsert};
use crate::engine::{CatalogEngine, ConnectionConfig, DatabaseType};
use crate::error::{BookshelfError, Result};
use crate::model::{Book, Category};
use crate::query::{compile, QuerySpec, SqlValue, Statement};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Pooled handle to a `PostgreSQL` catalogue
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Build the connection pool
    ///
    /// Connections are established lazily, so this succeeds without a
    /// reachable server; use [`CatalogEngine::ping`] to check.
    pub fn connect(config: &ConnectionConfig, pool_size: usize) -> Result<Self> {
        config.expect_engine(DatabaseType::Postgres)?;

        let mut pg_config = build_pg_config(config)?;
        pg_config.pool = Some(PoolConfig::new(pool_size.max(1)));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                BookshelfError::connection_failed(format!("Failed to create PostgreSQL pool: {e}"))
            })?;

        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            BookshelfError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })
    }
}

impl CatalogEngine for PostgresStore {
    fn engine(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(|e| {
            BookshelfError::connection_failed(format!("Failed to query PostgreSQL: {e}"))
        })?;
        Ok(())
    }

    async fn fetch_books(&self, spec: &QuerySpec) -> Result<Vec<Book>> {
        let compiled = compile(spec, DatabaseType::Postgres);
        let statement = read::select_books(DatabaseType::Postgres, compiled);

        let conn = self.get_conn().await?;
        let client: &tokio_postgres::Client = &conn;
        let rows = query(client, &statement).await?;

        rows.iter().map(row_to_book).collect()
    }

    async fn save_book(&self, mut book: Book) -> Result<Book> {
        let mut conn = self.get_conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;

        let tx = client.transaction().await.map_err(|e| {
            BookshelfError::transaction_failed(format!("Failed to begin transaction: {e}"))
        })?;

        match write_book(&tx, &mut book).await {
            Ok(()) => {
                tx.commit().await.map_err(|e| {
                    BookshelfError::transaction_failed(format!("Commit failed: {e}"))
                })?;
                tracing::debug!(book_id = book.id, "committed book write");
                Ok(book)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                tracing::debug!(error = %err, "rolled back book write");
                Err(err)
            }
        }
    }
}

/// Build the pool config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| BookshelfError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| BookshelfError::invalid_input("PostgreSQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| BookshelfError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let password = config
        .password
        .as_ref()
        .ok_or_else(|| BookshelfError::invalid_input("PostgreSQL requires 'password' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| BookshelfError::invalid_input("PostgreSQL requires 'database' parameter"))?;

    let mut pg_config = Config::new();
    pg_config.host = Some(host.clone());
    pg_config.port = Some(port);
    pg_config.user = Some(user.clone());
    pg_config.password = Some(password.clone());
    pg_config.dbname = Some(database.clone());
    pg_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    Ok(pg_config)
}

/// Prepare `statement`, bind its values by inferred type and run it
async fn query<C>(client: &C, statement: &Statement) -> Result<Vec<Row>>
where
    C: GenericClient + Sync,
{
    let prepared = client
        .prepare(statement.sql())
        .await
        .map_err(|e| BookshelfError::query_failed(format!("Failed to prepare statement: {e}")))?;

    let params = bind_params(statement.values(), prepared.params())?;
    let refs: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect();

    client
        .query(&prepared, &refs)
        .await
        .map_err(|e| BookshelfError::query_failed(format!("Failed to execute statement: {e}")))
}

fn bind_params(values: &[SqlValue], types: &[Type]) -> Result<Vec<BoxedParam>> {
    if values.len() != types.len() {
        return Err(BookshelfError::query_failed(format!(
            "Statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(types)
        .map(|(value, ty)| to_pg_param(value, ty))
        .collect()
}

/// Convert a value to the concrete Rust type `tokio-postgres` expects for `ty`
fn to_pg_param(value: &SqlValue, ty: &Type) -> Result<BoxedParam> {
    let param: BoxedParam = match (value, ty) {
        (SqlValue::Text(v), _)
            if matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME) =>
        {
            Box::new(v.clone())
        }

        (SqlValue::Integer(v), &Type::INT2) => Box::new(narrow::<i16>(*v, ty)?),
        (SqlValue::Integer(v), &Type::INT4) => Box::new(narrow::<i32>(*v, ty)?),
        (SqlValue::Integer(v), &Type::INT8) => Box::new(*v),
        #[allow(clippy::cast_precision_loss)]
        (SqlValue::Integer(v), &Type::FLOAT8) => Box::new(*v as f64),

        #[allow(clippy::cast_possible_truncation)]
        (SqlValue::Real(v), &Type::FLOAT4) => Box::new(*v as f32),
        (SqlValue::Real(v), &Type::FLOAT8) => Box::new(*v),

        (SqlValue::Timestamp(v), &Type::TIMESTAMPTZ) => Box::new(*v),
        (SqlValue::Timestamp(v), &Type::TIMESTAMP) => Box::new(v.naive_utc()),
        (SqlValue::Timestamp(v), &Type::DATE) => Box::new(v.date_naive()),

        (value, ty) => {
            return Err(BookshelfError::query_failed(format!(
                "Cannot bind {value:?} to PostgreSQL type '{}'",
                ty.name()
            )));
        }
    };
    Ok(param)
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> Result<T> {
    T::try_from(value).map_err(|_| {
        BookshelfError::query_failed(format!("Value {value} out of range for '{}'", ty.name()))
    })
}

/// Read an identifier column regardless of `SERIAL`/`BIGSERIAL`
fn read_id(row: &Row, idx: usize) -> Result<i64> {
    let col_type = row.columns()[idx].type_();
    let value = match *col_type {
        Type::INT4 => row.try_get::<_, i32>(idx).map(i64::from),
        Type::INT8 => row.try_get::<_, i64>(idx),
        _ => {
            return Err(BookshelfError::query_failed(format!(
                "Unexpected identifier type '{}'",
                col_type.name()
            )));
        }
    };
    value.map_err(|e| BookshelfError::query_failed(format!("Failed to get id value: {e}")))
}

fn row_to_book(row: &Row) -> Result<Book> {
    let get_err = |e: tokio_postgres::Error| {
        BookshelfError::query_failed(format!("Failed to decode book row: {e}"))
    };

    let content: Option<String> = row.try_get(3).map_err(get_err)?;
    let created_at: Option<DateTime<Utc>> = row.try_get(4).map_err(get_err)?;
    let updated_at: Option<DateTime<Utc>> = row.try_get(5).map_err(get_err)?;
    let aggregated: serde_json::Value = row.try_get(6).map_err(get_err)?;

    Ok(Book {
        id: Some(read_id(row, 0)?),
        title: row.try_get(1).map_err(get_err)?,
        author: row.try_get(2).map_err(get_err)?,
        content: content.unwrap_or_default(),
        created_at,
        updated_at,
        categories: read::decode_categories(aggregated)?,
    })
}

async fn write_book(tx: &tokio_postgres::Transaction<'_>, book: &mut Book) -> Result<()> {
    let dialect = DatabaseType::Postgres;

    let inserted = query(tx, &upsert::insert_book(dialect, book))
        .await
        .map_err(into_tx_error)?;
    let book_id = match inserted.first() {
        Some(row) => read_id(row, 0)?,
        None => {
            tracing::debug!(title = %book.title, "book insert suppressed, reusing existing row");
            let found = query(tx, &upsert::find_book_id(dialect, book))
                .await
                .map_err(into_tx_error)?;
            let row = found
                .first()
                .ok_or_else(|| BookshelfError::transaction_failed("Conflicting book not found"))?;
            read_id(row, 0)?
        }
    };
    book.id = Some(book_id);

    let names = book.distinct_category_names();
    let resolved = match upsert::upsert_categories(dialect, &names) {
        Some(statement) => {
            let rows = query(tx, &statement).await.map_err(into_tx_error)?;
            let name_err = |e: tokio_postgres::Error| {
                BookshelfError::transaction_failed(format!("Failed to read category name: {e}"))
            };
            rows.iter()
                .map(|row| {
                    Ok(Category {
                        id: Some(read_id(row, 0)?),
                        name: row.try_get(1).map_err(name_err)?,
                        created_at: None,
                    })
                })
                .collect::<Result<Vec<Category>>>()?
        }
        None => Vec::new(),
    };
    tracing::debug!(book_id, categories = resolved.len(), "resolved categories");

    upsert::rebind_categories(book, &resolved)?;

    if let Some(statement) = upsert::insert_associations(dialect, book_id, book)? {
        query(tx, &statement).await.map_err(into_tx_error)?;
        tracing::debug!(book_id, "inserted associations");
    }

    Ok(())
}

/// Report any failure inside the write as a transaction failure
fn into_tx_error(err: BookshelfError) -> BookshelfError {
    match err {
        BookshelfError::TransactionFailed(_) => err,
        other => BookshelfError::transaction_failed(other.message()),
    }
}
