//! SQLite backend for ormkit.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate provides a [`Backend`] over libsqlite3. It renders statements
//! with the SQLite dialect, opens one [`SqliteConnection`] per statement or
//! transaction, and classifies extended result codes into ormkit's
//! [`DatabaseCode`](ormkit_core::DatabaseCode) set.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormkit_sqlite::{SqliteBackend, SqliteConfig};
//!
//! let backend = SqliteBackend::new(SqliteConfig::file("app.db"));
//! backend.execute_script("CREATE TABLE \"User\" (\"ID\" TEXT PRIMARY KEY)")?;
//! let mut session = Session::new(&registry, backend);
//! ```
//!
//! A `:memory:` database lives only as long as its connection, so a backend
//! over one sees an empty database on every call. Use a file path.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

use ormkit_core::{Backend, CodeClassifier, DatabaseCode, Dialect, Result};

/// Extended result codes mapped onto the closed code set.
pub fn classifier() -> CodeClassifier {
    CodeClassifier::new()
        .with(ffi::SQLITE_OK.to_string(), DatabaseCode::Success)
        .with(ffi::SQLITE_CONSTRAINT_UNIQUE.to_string(), DatabaseCode::DuplicateEntry)
        .with(ffi::SQLITE_CONSTRAINT_PRIMARYKEY.to_string(), DatabaseCode::DuplicateEntry)
        .with(ffi::SQLITE_CONSTRAINT_FOREIGNKEY.to_string(), DatabaseCode::ForeignKeyViolation)
}

/// A [`Backend`] over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    config: SqliteConfig,
    classifier: CodeClassifier,
}

impl SqliteBackend {
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            classifier: classifier(),
        }
    }

    /// Backend over a database file, created if missing.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(SqliteConfig::file(path))
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run unbound SQL (schema, fixtures) on a fresh connection.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        SqliteConnection::open(&self.config)?.execute_raw(sql)
    }
}

impl Backend for SqliteBackend {
    type Conn = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::open(&self.config)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn classifier(&self) -> &CodeClassifier {
        &self.classifier
    }
}

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
