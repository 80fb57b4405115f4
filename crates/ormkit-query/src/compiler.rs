//! Predicate compiler.
//!
//! Resolves each leaf of a [`Predicate`] against the model's fields, coerces
//! and validates its literal, and builds the matching [`Condition`]. No SQL
//! exists until the whole predicate compiled.

use ormkit_core::error::CompilationErrorKind;
use ormkit_core::{
    Error, FieldInfo, FieldKind, ModelInfo, Result, ValidationError, Validators, Value,
};

use crate::condition::{Condition, Literal, Operator, sql_literal};
use crate::predicate::{Predicate, col};

/// Compile a predicate over `model`.
pub fn compile(
    model: &ModelInfo,
    validators: &Validators,
    predicate: &Predicate,
) -> Result<Condition> {
    match predicate {
        Predicate::Compare { field, op, value } => {
            compile_leaf(model, validators, field, *op, value.clone())
        }
        Predicate::Combine { left, logic, right } => Ok(Condition::Combinator {
            left: Box::new(compile(model, validators, left)?),
            logic: *logic,
            right: Box::new(compile(model, validators, right)?),
        }),
    }
}

/// Equality on every primary-key field, joined with AND.
pub fn key_condition(
    model: &ModelInfo,
    validators: &Validators,
    key: &[Value],
) -> Result<Condition> {
    let mut predicate: Option<Predicate> = None;
    for (field, value) in model.primary_key().zip(key) {
        let leaf = col(field.name).eq(value.clone());
        predicate = Some(match predicate {
            Some(p) => p.and(leaf),
            None => leaf,
        });
    }
    let predicate = predicate.ok_or_else(|| {
        Error::compilation(
            CompilationErrorKind::InvalidModel,
            model.name,
            "Model has no primary key",
        )
    })?;
    compile(model, validators, &predicate)
}

type LeafFn = fn(&ModelInfo, &FieldInfo, Operator, Value) -> Condition;

fn compile_leaf(
    model: &ModelInfo,
    validators: &Validators,
    name: &str,
    op: Operator,
    value: Value,
) -> Result<Condition> {
    let field = model.require_field(name)?;

    if value.is_null() {
        return null_check(model, field, op);
    }

    if op.is_relational() && !field.kind.is_ordered() {
        return Err(Error::compilation(
            CompilationErrorKind::UnsupportedOperator,
            model.name,
            format!("Operator {op} is not supported by field {}", field.name),
        ));
    }

    let value = field.coerce(value)?;
    validators.check(field, &value)?;
    tracing::trace!(model = model.name, field = field.name, op = %op, "compiled leaf");

    let leaf: LeafFn = match &field.kind {
        FieldKind::Id { .. }
        | FieldKind::Text { .. }
        | FieldKind::Email { .. }
        | FieldKind::Enum { .. } => text_leaf,
        FieldKind::Integer { .. } => integer_leaf,
        FieldKind::Boolean => boolean_leaf,
        FieldKind::Date | FieldKind::Timestamp => temporal_leaf,
    };
    Ok(leaf(model, field, op, value))
}

/// `= NULL` / `!= NULL` become `IS NULL` / `IS NOT NULL`.
fn null_check(model: &ModelInfo, field: &FieldInfo, op: Operator) -> Result<Condition> {
    if op.is_relational() {
        return Err(Error::compilation(
            CompilationErrorKind::UnsupportedOperator,
            model.name,
            format!("Operator {op} cannot compare field {} with null", field.name),
        ));
    }
    if field.required {
        let mut err = ValidationError::new();
        err.add_null(field.name);
        return Err(err.into());
    }
    Ok(Condition::NullCheck {
        table: model.name,
        field: field.name,
        negated: op == Operator::Ne,
    })
}

fn comparison(
    model: &ModelInfo,
    field: &FieldInfo,
    op: Operator,
    value: Value,
    inline: Option<String>,
) -> Condition {
    let literal = match inline {
        Some(sql) if field.embeddable => Literal::Inline(sql),
        _ => Literal::Bound,
    };
    Condition::Comparison {
        table: model.name,
        field: field.name,
        op,
        value,
        literal,
    }
}

fn text_leaf(model: &ModelInfo, field: &FieldInfo, op: Operator, value: Value) -> Condition {
    let inline = sql_literal(&value);
    comparison(model, field, op, value, inline)
}

fn integer_leaf(model: &ModelInfo, field: &FieldInfo, op: Operator, value: Value) -> Condition {
    let inline = value.as_i64().map(|v| v.to_string());
    comparison(model, field, op, value, inline)
}

fn boolean_leaf(model: &ModelInfo, field: &FieldInfo, op: Operator, value: Value) -> Condition {
    let inline = value.as_bool().map(|b| if b { "true" } else { "false" }.to_string());
    comparison(model, field, op, value, inline)
}

fn temporal_leaf(model: &ModelInfo, field: &FieldInfo, op: Operator, value: Value) -> Condition {
    let inline = sql_literal(&value);
    comparison(model, field, op, value, inline)
}
