//! Bookshelf CLI Entry Point
//!
//! Subcommands:
//! - `serve` - HTTP server over the catalogue
//! - `list` - one read, parameters given as `--param key=value`
//! - `add` - one write, book JSON from a file or stdin
//! - `ping` - check that the store is reachable
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;

use bookshelf::logging::{self, Profile};
use bookshelf::{
    config, handle_read, handle_write, http, BookshelfError, CatalogEngine, ConnectionOverrides,
    DatabaseType, ErrorEnvelope, ErrorInfo, Metadata, Store, SuccessEnvelope,
};

/// Bookshelf - book and category catalogue service
#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "Catalogue of books and weighted categories over a relational store")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log output profile (logs always go to stderr)
    #[arg(long, value_enum, default_value_t = Profile::Development, global = true)]
    log: Profile,

    #[command(subcommand)]
    command: Commands,
}

/// Connection selection; explicit flags override the config files
#[derive(Args)]
struct ConnectionArgs {
    /// Named connection from the config files
    #[arg(long, global = true)]
    name: Option<String>,

    /// Store engine (postgres, sqlite)
    #[arg(long, global = true, value_parser = parse_engine)]
    engine: Option<DatabaseType>,

    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    port: Option<u16>,

    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[arg(long, global = true)]
    database: Option<String>,

    /// `SQLite` database file
    #[arg(long, global = true)]
    file: Option<PathBuf>,
}

impl ConnectionArgs {
    fn into_overrides(self) -> ConnectionOverrides {
        ConnectionOverrides {
            engine: self.engine,
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            database: self.database,
            file: self.file,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the catalogue over HTTP
    Serve {
        /// Listen address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// List books
    List {
        /// Read parameter, e.g. `--param sort=title --param 'weight[gte]=3'`
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Add a book from JSON
    Add {
        /// File holding the book JSON (stdin when absent)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Check that the store is reachable
    Ping,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Serve { .. } => "serve",
            Self::List { .. } => "list",
            Self::Add { .. } => "add",
            Self::Ping => "ping",
        }
    }
}

fn parse_engine(raw: &str) -> Result<DatabaseType, String> {
    match raw {
        "postgres" => Ok(DatabaseType::Postgres),
        "sqlite" => Ok(DatabaseType::SQLite),
        _ => Err(format!("Invalid engine '{raw}'. Must be postgres or sqlite")),
    }
}

/// Split `key=value` at the first `=`; a bare key has an empty value
fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    if key.is_empty() {
        return Err(format!("Parameter '{raw}' has no key"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log);

    let command = cli.command.name();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let envelope = match err.downcast_ref::<BookshelfError>() {
                Some(e) => ErrorEnvelope::from_error("", command, e),
                None => {
                    let info = ErrorInfo::new("INTERNAL_ERROR", format!("{err:#}"));
                    ErrorEnvelope::new("", command, info)
                }
            };
            print_json(&envelope);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = config::load_with_precedence()?;
    let server = settings.server_config();
    let Cli { connection, command, .. } = cli;
    let name = connection.name.clone();
    let resolved = settings.resolve_connection(name.as_deref(), connection.into_overrides())?;
    let store = Store::open(&resolved, server.pool_size)?;

    match command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or(server.bind);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;

            tracing::info!(%addr, engine = %store.engine(), "listening");
            axum::serve(listener, http::router(Arc::new(store)))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("HTTP server failed")?;
            tracing::info!("shut down");
            Ok(ExitCode::SUCCESS)
        }

        Commands::List { params } => {
            let start = Instant::now();
            let result = handle_read(&store, params).await.map(|books| {
                let rows = books.len();
                (books, Some(rows))
            });
            Ok(report(store.engine(), "list", start, result))
        }

        Commands::Add { input } => {
            let body = read_input(input).await?;
            let start = Instant::now();
            let result = handle_write(&store, &body).await.map(|book| (book, None));
            Ok(report(store.engine(), "add", start, result))
        }

        Commands::Ping => {
            let start = Instant::now();
            let result = store.ping().await;
            Ok(report(
                store.engine(),
                "ping",
                start,
                result.map(|()| (serde_json::json!({ "status": "ok" }), None)),
            ))
        }
    }
}

/// Print the envelope for a finished command and pick the exit code
fn report<T: Serialize>(
    engine: DatabaseType,
    command: &str,
    start: Instant,
    result: bookshelf::Result<(T, Option<usize>)>,
) -> ExitCode {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok((data, rows)) => {
            let meta = match rows {
                Some(rows) => Metadata::with_rows(elapsed_ms, rows),
                None => Metadata::new(elapsed_ms),
            };
            print_json(&SuccessEnvelope::new(engine.as_str(), command, data, meta));
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_json(&ErrorEnvelope::from_error(engine.as_str(), command, &err));
            ExitCode::FAILURE
        }
    }
}

async fn read_input(input: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut body = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut body)
                .await
                .context("Failed to read stdin")?;
            Ok(body)
        }
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
