//! SQLite connection implementation.
//!
//! This module provides a safe wrapper around SQLite's C API and implements
//! the [`Connection`] trait from ormkit-core. Connections are single-owner:
//! open one, run a query or a transaction, drop it.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use ormkit_core::error::ConsistencyErrorKind;
use ormkit_core::{CodeClassifier, Connection, Error, Result, Row, Statement, Value};
use ormkit_core::row::ColumnInfo;
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Enforce foreign key constraints (`PRAGMA foreign_keys`).
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::file(":memory:")
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    path: String,
    classifier: CodeClassifier,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let classifier = crate::classifier();
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            classifier.error(None, "Invalid path: contains null byte", None)
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid until closed below
                unsafe {
                    let msg = ffi::last_message(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(classifier.error(
                Some(rc.to_string()),
                format!("Failed to open database: {}", msg),
                None,
            ));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let conn = Self {
            db,
            path: config.path.clone(),
            classifier,
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        tracing::trace!(path = %conn.path, "sqlite connection opened");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute one or more `;`-separated statements without binding (DDL,
    /// fixtures, transaction control).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql)
            .map_err(|_| self.classifier.error(None, "SQL contains null byte", Some(sql.to_string())))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is valid and owned by us
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            // SAFETY: db is valid
            let code = unsafe { ffi::sqlite3_extended_errcode(self.db) };
            return Err(self
                .classifier
                .error(Some(code.to_string()), msg, Some(sql.to_string())));
        }

        Ok(())
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(self.db) };
        changes.max(0) as u64
    }

    /// Prepare and run a query, returning all rows.
    fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.prepare(sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name = unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(self.last_error(sql)),
            }
        }

        Ok(rows)
    }

    /// Prepare and run a statement, returning rows affected.
    fn execute_statement(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = self.prepare(sql, params)?;
        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(stmt.raw) } {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(self.changes()),
            _ => Err(self.last_error(sql)),
        }
    }

    fn prepare(&self, sql: &str, params: &[Value]) -> Result<Prepared> {
        let c_sql = CString::new(sql)
            .map_err(|_| self.classifier.error(None, "SQL contains null byte", Some(sql.to_string())))?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.last_error(sql));
        }
        let stmt = Prepared { raw };

        // SAFETY: stmt is valid
        let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt.raw) };
        if expected as usize != params.len() {
            return Err(Error::consistency(
                ConsistencyErrorKind::ParameterMismatch,
                format!(
                    "Statement expects {} parameters but {} were given",
                    expected,
                    params.len()
                ),
            ));
        }

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(stmt.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                return Err(self.last_error(sql));
            }
        }
        Ok(stmt)
    }

    fn last_error(&self, sql: &str) -> Error {
        // SAFETY: db is valid
        let (code, msg) = unsafe { (ffi::sqlite3_extended_errcode(self.db), ffi::last_message(self.db)) };
        self.classifier
            .error(Some(code.to_string()), msg, Some(sql.to_string()))
    }

    fn rollback(&self) {
        if let Err(e) = self.execute_raw("ROLLBACK") {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and every statement has been finalized
            unsafe {
                ffi::sqlite3_close(self.db);
            }
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A prepared statement, finalized on drop.
struct Prepared {
    raw: *mut ffi::sqlite3_stmt,
}

impl Drop for Prepared {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 and is finalized once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        self.query_rows(&statement.sql, &statement.params)
    }

    fn execute_in_transaction(&mut self, statements: &[Statement]) -> Result<u64> {
        self.execute_raw("BEGIN IMMEDIATE")?;

        let mut affected = 0;
        for statement in statements {
            match self.execute_statement(&statement.sql, &statement.params) {
                Ok(n) => affected += n,
                Err(e) => {
                    self.rollback();
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.execute_raw("COMMIT") {
            self.rollback();
            return Err(e);
        }
        tracing::trace!(statements = statements.len(), affected, "transaction committed");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::DatabaseCode;
    use ormkit_core::value::parse_date;

    fn open(dir: &tempfile::TempDir) -> SqliteConnection {
        let path = dir.path().join("test.db");
        SqliteConnection::open_file(path.to_string_lossy().to_string()).unwrap()
    }

    fn stmt(sql: &str, params: Vec<Value>) -> Statement {
        Statement::new(sql, params)
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
    }

    #[test]
    fn test_execute_raw_and_query() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO test (name) VALUES ('Alice'), ('Bob');",
        )
        .unwrap();

        let rows = conn
            .query(&stmt("SELECT id, name AS \"test.name\" FROM test ORDER BY id", vec![]))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 1);
        assert_eq!(rows[1].get_named::<String>("test.name").unwrap(), "Bob");
    }

    #[test]
    fn test_numbered_parameters_and_nulls() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, born TEXT, ok INTEGER)")
            .unwrap();

        let born = parse_date("1990-05-17").unwrap();
        conn.execute_in_transaction(&[stmt(
            "INSERT INTO test (name, born, ok) VALUES (?1, ?2, ?3)",
            vec![Value::Null, Value::Date(born), Value::Bool(true)],
        )])
        .unwrap();

        let rows = conn
            .query(&stmt("SELECT name, born, ok FROM test WHERE ok = ?1", vec![Value::Bool(true)]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<Option<String>>("name").unwrap(), None);
        assert_eq!(rows[0].get_by_name("born"), Some(&Value::from("1990-05-17")));
        assert_eq!(rows[0].get_by_name("ok"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_parameter_mismatch() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER)").unwrap();
        let err = conn
            .query(&stmt("SELECT * FROM test WHERE id = ?1", vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ref e) if e.kind == ConsistencyErrorKind::ParameterMismatch
        ));
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open(&dir);
        conn.execute_raw("CREATE TABLE test (id TEXT PRIMARY KEY, name TEXT)").unwrap();

        let err = conn
            .execute_in_transaction(&[
                stmt("INSERT INTO test VALUES (?1, ?2)", vec!["A".into(), "Alice".into()]),
                stmt("INSERT INTO test VALUES (?1, ?2)", vec!["A".into(), "Again".into()]),
            ])
            .unwrap_err();
        assert_eq!(err.database_code(), Some(DatabaseCode::DuplicateEntry));
        assert!(err.sql().is_some_and(|sql| sql.starts_with("INSERT")));

        let rows = conn.query(&stmt("SELECT * FROM test", vec![])).unwrap();
        assert!(rows.is_empty());

        let affected = conn
            .execute_in_transaction(&[stmt(
                "INSERT INTO test VALUES (?1, ?2)",
                vec!["A".into(), "Alice".into()],
            )])
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn test_foreign_key_violation() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE parent (id TEXT PRIMARY KEY);
             CREATE TABLE child (id TEXT PRIMARY KEY, parent TEXT REFERENCES parent(id));",
        )
        .unwrap();
        let err = conn
            .execute_in_transaction(&[stmt(
                "INSERT INTO child VALUES (?1, ?2)",
                vec!["C".into(), "missing".into()],
            )])
            .unwrap_err();
        assert_eq!(err.database_code(), Some(DatabaseCode::ForeignKeyViolation));
    }

    #[test]
    fn test_open_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.db").to_string_lossy().to_string();

        let conn = SqliteConnection::open(&SqliteConfig::file(path.clone())).unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER)").unwrap();
        drop(conn);

        let mut conn =
            SqliteConnection::open(&SqliteConfig::file(path).flags(OpenFlags::read_only())).unwrap();
        assert!(conn.query(&stmt("SELECT * FROM test", vec![])).unwrap().is_empty());
        assert!(conn.execute_raw("INSERT INTO test VALUES (1)").is_err());
    }

    #[test]
    fn test_missing_database_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db").to_string_lossy().to_string();
        let err = SqliteConnection::open(&SqliteConfig::file(path).flags(OpenFlags::read_write()))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open database"));
    }
}
