//! Error types for ormkit operations.

use std::fmt;

/// The primary error type for all ormkit operations.
#[derive(Debug)]
pub enum Error {
    /// A value failed a field's required/format/range rule
    Validation(ValidationError),
    /// A predicate, include or model declaration could not be compiled
    Compilation(CompilationError),
    /// A "get exactly one" call matched no rows
    NotFound(NotFoundError),
    /// A "single" call matched more than one row
    MultipleRows(MultipleRowsError),
    /// The backend rejected a statement or transaction
    Database(DatabaseError),
    /// The session state does not allow the requested operation
    Consistency(ConsistencyError),
    /// A backend value could not be decoded into a field
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
}

/// Validation error for field-level validation.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The errors, one per offending field
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field was never set
    Required,
    /// Required field compared or assigned to null
    Null,
    /// String does not have the exact expected length
    Length,
    /// String is shorter than minimum length
    MinLength,
    /// String is longer than maximum length
    MaxLength,
    /// Value doesn't match the field pattern or character pool
    Pattern,
    /// Value is below minimum
    Min,
    /// Value is above maximum
    Max,
    /// Value is not one of the enum variants
    Enum,
    /// Value is not in an accepted textual format
    Format,
    /// Value has the wrong type for the field
    Type,
}

#[derive(Debug)]
pub struct CompilationError {
    pub kind: CompilationErrorKind,
    /// Model the failing predicate/declaration belongs to
    pub model: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationErrorKind {
    /// Model is not present in the registry
    UnknownModel,
    /// Field is not declared on the model
    UnknownField,
    /// Operator is not supported by the field kind
    UnsupportedOperator,
    /// Navigation is not declared on the model
    UnknownNavigation,
    /// Navigation was included twice in one fetch
    DuplicateInclude,
    /// Model declaration is malformed
    InvalidModel,
    /// Navigation declaration cannot be resolved
    InvalidNavigation,
}

#[derive(Debug)]
pub struct NotFoundError {
    pub model: String,
    pub sql: Option<String>,
}

#[derive(Debug)]
pub struct MultipleRowsError {
    pub model: String,
    pub count: usize,
}

/// Closed set of database-level outcomes exposed by the core.
///
/// Backend state codes are mapped onto this set by a
/// [`CodeClassifier`](crate::connection::CodeClassifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseCode {
    Success,
    /// Unique or primary key violation
    DuplicateEntry,
    /// Foreign key restriction violated
    ForeignKeyViolation,
    /// The backend rejected the table/model shape
    InvalidModel,
    /// The backend rejected a column value
    InvalidField,
    /// Any code the classifier does not know
    Unknown,
}

impl DatabaseCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DatabaseCode::Success => "success",
            DatabaseCode::DuplicateEntry => "duplicate entry",
            DatabaseCode::ForeignKeyViolation => "foreign key violation",
            DatabaseCode::InvalidModel => "invalid model",
            DatabaseCode::InvalidField => "invalid field",
            DatabaseCode::Unknown => "unknown",
        }
    }
}

#[derive(Debug)]
pub struct DatabaseError {
    /// Classified outcome
    pub code: DatabaseCode,
    /// Raw backend state code (SQLSTATE, extended result code, ...)
    pub state: Option<String>,
    pub message: String,
    pub sql: Option<String>,
}

#[derive(Debug)]
pub struct ConsistencyError {
    pub kind: ConsistencyErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyErrorKind {
    /// Model is owned by another session
    ForeignModel,
    /// Model was queued for saving without any changed field
    NoChanges,
    /// Same field assigned twice in one bulk update
    DuplicateAssignment,
    /// Bulk update saved without assignments
    NoAssignments,
    /// Statement has no target table
    NoTable,
    /// Insert has no columns
    NoColumns,
    /// Placeholder count does not match the parameter list
    ParameterMismatch,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a required field error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(field, ValidationErrorKind::Required, "Value is required");
    }

    /// Add a null-on-required-field error.
    pub fn add_null(&mut self, field: impl Into<String>) {
        self.add(field, ValidationErrorKind::Null, "Value cannot be null");
    }

    /// Build an error holding exactly one field failure.
    pub fn single(field: impl Into<String>, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(field, kind, message);
        err
    }

    /// Whether any recorded failure concerns the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Shorthand for a [`CompilationError`].
    pub fn compilation(
        kind: CompilationErrorKind,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Compilation(CompilationError {
            kind,
            model: model.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a [`ConsistencyError`].
    pub fn consistency(kind: ConsistencyErrorKind, message: impl Into<String>) -> Self {
        Error::Consistency(ConsistencyError {
            kind,
            message: message.into(),
        })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_compilation(&self) -> bool {
        matches!(self, Error::Compilation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }

    /// Classified database outcome, if this is a backend error.
    pub fn database_code(&self) -> Option<DatabaseCode> {
        match self {
            Error::Database(e) => Some(e.code),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Database(e) => e.sql.as_deref(),
            Error::NotFound(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "{}", e),
            Error::Compilation(e) => write!(f, "Compilation error in model {}: {}", e.model, e.message),
            Error::NotFound(e) => write!(f, "Model {} not found", e.model),
            Error::MultipleRows(e) => write!(
                f,
                "Expected a single {} but the query returned {} rows",
                e.model, e.count
            ),
            Error::Database(e) => {
                if let Some(state) = &e.state {
                    write!(f, "Database error ({}, code {}): {}", e.code.as_str(), state, e.message)
                } else {
                    write!(f, "Database error ({}): {}", e.code.as_str(), e.message)
                }
            }
            Error::Consistency(e) => write!(f, "{}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid value for field {}: {}", self.field, self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "validation passed"),
            [single] => write!(f, "{}", single),
            errors => {
                write!(f, "Model validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<FieldValidationError> for Error {
    fn from(err: FieldValidationError) -> Self {
        Error::Validation(ValidationError { errors: vec![err] })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for ormkit operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_validation_error_names_field() {
        let err = Error::from(ValidationError::single(
            "ID",
            ValidationErrorKind::Length,
            "Value length is not 10",
        ));
        assert_eq!(err.to_string(), "Invalid value for field ID: Value length is not 10");
        assert!(err.is_validation());
    }

    #[test]
    fn multiple_validation_errors_are_listed() {
        let mut err = ValidationError::new();
        err.add_required("Name");
        err.add_required("Email");
        assert!(err.has_field("Email"));
        assert_eq!(
            err.to_string(),
            "Model validation failed: Invalid value for field Name: Value is required, \
             Invalid value for field Email: Value is required"
        );
    }

    #[test]
    fn empty_validation_into_result() {
        assert!(ValidationError::new().into_result().is_ok());
        let mut err = ValidationError::new();
        err.add_null("ID");
        assert_eq!(err.into_result().unwrap_err().errors[0].kind, ValidationErrorKind::Null);
    }

    #[test]
    fn database_error_display_includes_code() {
        let err = Error::Database(DatabaseError {
            code: DatabaseCode::DuplicateEntry,
            state: Some("23505".to_string()),
            message: "duplicate key".to_string(),
            sql: Some("INSERT".to_string()),
        });
        assert_eq!(err.database_code(), Some(DatabaseCode::DuplicateEntry));
        assert_eq!(err.sql(), Some("INSERT"));
        assert_eq!(
            err.to_string(),
            "Database error (duplicate entry, code 23505): duplicate key"
        );
    }

    #[test]
    fn consistency_display_is_message() {
        let err = Error::consistency(ConsistencyErrorKind::NoChanges, "No changes to save.");
        assert!(err.is_consistency());
        assert_eq!(err.to_string(), "No changes to save.");
    }
}
