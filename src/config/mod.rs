//! Configuration Management
//!
//! This module loads named store connections and server settings.
//!
//! # Configuration Locations
//! - Local: `.bookshelf/config.json` (per-project)
//! - Global: `~/.config/bookshelf/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit connection parameters (highest priority)
//! 2. Local config file
//! 3. Global config file
//!
//! # File Format
//! ```json
//! {
//!   "connections": {
//!     "local": { "engine": "sqlite", "file": "books.db" },
//!     "prod": { "engine": "postgres", "host": "db", "port": 5432,
//!               "user": "books", "database": "books", "password_env": "BOOKS_PW" }
//!   },
//!   "default": "local",
//!   "server": { "bind": "127.0.0.1:8080", "pool_size": 16 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{ConnectionConfig, DatabaseType};
use crate::error::{BookshelfError, Result};

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default number of pooled `PostgreSQL` connections
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Contents of one config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookshelfConfig {
    /// Named connections
    #[serde(default)]
    pub connections: HashMap<String, StoredConnection>,

    /// Name of the default connection (must exist in connections map)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// HTTP server settings; absent means defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Upper bound on pooled store connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Stored connection configuration
///
/// Similar to `ConnectionConfig` but supports environment variable references
/// for sensitive fields like passwords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for password (if not storing password directly)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Resolve environment variables into a `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                BookshelfError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }
}

/// Connection parameters given explicitly (CLI flags)
///
/// Set fields override whatever the named connection holds.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub engine: Option<DatabaseType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub file: Option<PathBuf>,
}

impl ConnectionOverrides {
    fn apply(&self, config: &mut ConnectionConfig) {
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(user) = &self.user {
            config.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
        if let Some(file) = &self.file {
            config.file = Some(file.clone());
        }
    }

    /// Build a complete config from the overrides alone
    fn into_config(self, engine: DatabaseType) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig {
            engine,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: None,
        };
        self.apply(&mut config);

        let missing = match engine {
            DatabaseType::Postgres => [
                ("host", config.host.is_none()),
                ("port", config.port.is_none()),
                ("user", config.user.is_none()),
                ("password", config.password.is_none()),
                ("database", config.database.is_none()),
            ]
            .iter()
            .find(|(_, absent)| *absent)
            .map(|(field, _)| *field),
            DatabaseType::SQLite => config.file.is_none().then_some("file"),
        };

        if let Some(field) = missing {
            return Err(BookshelfError::config_error(format!(
                "Missing required field for {engine}: {field}"
            )));
        }
        Ok(config)
    }
}

/// Get path to local config file (`.bookshelf/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        BookshelfError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".bookshelf").join("config.json"))
}

/// Get path to global config file (`~/.config/bookshelf/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| BookshelfError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("bookshelf").join("config.json"))
}

/// Load one config file; a missing file is an empty config
pub fn load_config(path: &Path) -> Result<BookshelfConfig> {
    if !path.exists() {
        return Ok(BookshelfConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| BookshelfError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        BookshelfError::config_error(format!(
            "Invalid config file format in {}: {e}",
            path.display()
        ))
    })
}

/// Overlay `local` on `global`
///
/// Connections merge by name with local entries winning; local `default`
/// and `server` replace the global ones when present.
#[must_use]
pub fn merge(global: BookshelfConfig, local: BookshelfConfig) -> BookshelfConfig {
    let mut merged = global;
    merged.connections.extend(local.connections);
    if local.default.is_some() {
        merged.default = local.default;
    }
    if local.server.is_some() {
        merged.server = local.server;
    }
    merged
}

/// Load the global then the local config and merge them
pub fn load_with_precedence() -> Result<BookshelfConfig> {
    let global = load_config(&global_config_path()?)?;
    let local = load_config(&local_config_path()?)?;
    Ok(merge(global, local))
}

impl BookshelfConfig {
    /// Effective server settings
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Resolve the connection to use
    ///
    /// 1. A named connection, with overrides applied on top
    /// 2. Overrides alone, when they name an engine
    /// 3. The default connection, with overrides applied on top
    pub fn resolve_connection(
        &self,
        name: Option<&str>,
        overrides: ConnectionOverrides,
    ) -> Result<ConnectionConfig> {
        if let Some(name) = name {
            let mut config = self.named(name)?;
            overrides.apply(&mut config);
            return Ok(config);
        }

        if let Some(engine) = overrides.engine {
            return overrides.into_config(engine);
        }

        let default = self.default.as_deref().ok_or_else(|| {
            let mut available: Vec<&String> = self.connections.keys().collect();
            available.sort();
            BookshelfError::config_error(format!(
                "No connection specified and no default connection configured. \
                 Available connections: {available:?}. Pass --name or --engine."
            ))
        })?;
        let mut config = self.named(default)?;
        overrides.apply(&mut config);
        Ok(config)
    }

    fn named(&self, name: &str) -> Result<ConnectionConfig> {
        let stored = self.connections.get(name).ok_or_else(|| {
            let mut available: Vec<&String> = self.connections.keys().collect();
            available.sort();
            BookshelfError::config_error(format!(
                "Connection '{name}' not found. Available connections: {available:?}"
            ))
        })?;
        stored.resolve()
    }
}
