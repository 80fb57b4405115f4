//! Core types and traits for ormkit.
//!
//! This crate provides the foundational abstractions the query and session
//! layers are built on:
//!
//! - [`Value`] for dynamically typed field values
//! - [`FieldInfo`] / [`FieldKind`] for field descriptors and their validators
//! - [`ModelInfo`] and the [`Registry`] of declared models
//! - [`ModelInstance`] with per-field change tracking
//! - [`Backend`] / [`Connection`] traits for statement execution
//! - [`Error`], the single error type of the workspace

pub mod connection;
pub mod dialect;
pub mod error;
pub mod field;
pub mod instance;
pub mod model;
pub mod row;
pub mod validate;
pub mod value;

pub use connection::{Backend, CodeClassifier, Connection, Statement};
pub use dialect::{Dialect, JsonColumn};
pub use error::{
    CompilationError, CompilationErrorKind, ConsistencyError, ConsistencyErrorKind,
    DatabaseCode, DatabaseError, Error, FieldValidationError, MultipleRowsError, NotFoundError,
    Result, TypeError, ValidationError, ValidationErrorKind,
};
pub use field::{FieldInfo, FieldKind, ReferentialAction};
pub use instance::{ModelInstance, ModelRef, SessionId};
pub use model::{ModelInfo, NavigationDef, NavigationInfo, NavigationKind, Registry};
pub use row::{ColumnInfo, FromValue, Row};
pub use validate::Validators;
pub use value::Value;
