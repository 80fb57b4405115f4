//! SQL fragments with ordered parameters.
//!
//! Fragments are assembled with dialect-neutral `?` markers. Only
//! [`Fragment::finish`] turns them into the backend's placeholders, so
//! nested fragments can be concatenated without renumbering.

use ormkit_core::error::ConsistencyErrorKind;
use ormkit_core::{Dialect, Error, Result, Statement, Value};

/// SQL text plus the parameters its `?` markers refer to, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    sql: String,
    params: Vec<Value>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment of SQL text without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a `?` marker bound to `value`.
    pub fn push_param(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Append another fragment, concatenating parameter lists.
    pub fn append(&mut self, other: Fragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// Substitute dialect placeholders and produce an executable statement.
    ///
    /// Fails when the number of markers outside quoted text differs from the
    /// number of parameters.
    pub fn finish(self, dialect: Dialect) -> Result<Statement> {
        let (sql, markers) = dialect.substitute_markers(&self.sql);
        if markers > self.params.len() {
            return Err(Error::consistency(
                ConsistencyErrorKind::ParameterMismatch,
                "Not enough values to execute query.",
            ));
        }
        if markers < self.params.len() {
            return Err(Error::consistency(
                ConsistencyErrorKind::ParameterMismatch,
                "Too many values to execute query.",
            ));
        }
        Ok(Statement::new(sql, self.params))
    }
}
