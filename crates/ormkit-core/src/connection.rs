//! Backend and connection traits.
//!
//! - [`Backend`] - Opens connections and describes the dialect
//! - [`Connection`] - Runs queries and all-or-nothing statement batches
//! - [`Statement`] - Final SQL text with its ordered parameters
//! - [`CodeClassifier`] - Maps backend state codes onto [`DatabaseCode`]
//!
//! A session opens a connection immediately before each statement or
//! transaction and drops it right after.

use std::collections::HashMap;
use std::fmt;

use crate::dialect::Dialect;
use crate::error::{DatabaseCode, DatabaseError, Error, Result};
use crate::row::Row;
use crate::value::Value;

/// Rendered SQL with dialect placeholders and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A live connection to the backend.
pub trait Connection {
    /// Execute a query and return all rows, in backend order.
    fn query(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    /// Execute every statement inside one transaction.
    ///
    /// Either all statements commit or none do. Returns the total number of
    /// affected rows.
    fn execute_in_transaction(&mut self, statements: &[Statement]) -> Result<u64>;
}

/// Factory for connections plus the backend's SQL conventions.
pub trait Backend {
    type Conn: Connection;

    /// Open a new connection.
    fn connect(&self) -> Result<Self::Conn>;

    /// SQL dialect used to render statements for this backend.
    fn dialect(&self) -> Dialect;

    /// Table mapping backend state codes to [`DatabaseCode`].
    fn classifier(&self) -> &CodeClassifier;
}

/// Injected table from backend state codes to the closed [`DatabaseCode`] set.
#[derive(Debug, Clone, Default)]
pub struct CodeClassifier {
    codes: HashMap<String, DatabaseCode>,
}

impl CodeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one mapping.
    pub fn with(mut self, state: impl Into<String>, code: DatabaseCode) -> Self {
        self.codes.insert(state.into(), code);
        self
    }

    /// PostgreSQL SQLSTATE classes.
    pub fn postgres() -> Self {
        Self::new()
            .with("00000", DatabaseCode::Success)
            .with("23505", DatabaseCode::DuplicateEntry)
            .with("23503", DatabaseCode::ForeignKeyViolation)
            .with("42P01", DatabaseCode::InvalidModel)
            .with("42703", DatabaseCode::InvalidField)
    }

    /// Classify a state code; unknown or missing codes map to `Unknown`.
    pub fn classify(&self, state: Option<&str>) -> DatabaseCode {
        state
            .and_then(|s| self.codes.get(s).copied())
            .unwrap_or(DatabaseCode::Unknown)
    }

    /// Build a classified [`Error::Database`].
    pub fn error(
        &self,
        state: Option<String>,
        message: impl Into<String>,
        sql: Option<String>,
    ) -> Error {
        Error::Database(DatabaseError {
            code: self.classify(state.as_deref()),
            state,
            message: message.into(),
            sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_classifier() {
        let c = CodeClassifier::postgres();
        assert_eq!(c.classify(Some("23505")), DatabaseCode::DuplicateEntry);
        assert_eq!(c.classify(Some("23503")), DatabaseCode::ForeignKeyViolation);
        assert_eq!(c.classify(Some("99999")), DatabaseCode::Unknown);
        assert_eq!(c.classify(None), DatabaseCode::Unknown);
    }

    #[test]
    fn test_classified_error() {
        let c = CodeClassifier::new().with("2067", DatabaseCode::DuplicateEntry);
        let err = c.error(
            Some("2067".to_string()),
            "UNIQUE constraint failed",
            Some("INSERT".to_string()),
        );
        assert_eq!(err.database_code(), Some(DatabaseCode::DuplicateEntry));
        assert_eq!(err.sql(), Some("INSERT"));
    }

    #[test]
    fn test_statement_display_is_sql() {
        let s = Statement::new("SELECT 1", vec![Value::Int(1)]);
        assert_eq!(s.to_string(), "SELECT 1");
    }
}
