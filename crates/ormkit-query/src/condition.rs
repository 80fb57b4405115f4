//! Condition trees.
//!
//! A [`Condition`] is the compiled form of a predicate over one model. The
//! same immutable tree renders to a SQL fragment and evaluates against an
//! in-memory [`ModelInstance`], so the database and the session cache agree
//! on which rows match.

use std::cmp::Ordering;
use std::fmt;

use ormkit_core::{Dialect, ModelInstance, Value};

use crate::fragment::Fragment;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Whether this operator orders its operands rather than testing equality.
    pub const fn is_relational(self) -> bool {
        !matches!(self, Operator::Eq | Operator::Ne)
    }

    /// Whether `lhs <op> rhs` holds for an ordering of lhs against rhs.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Boolean connective of a [`Condition::Combinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// How a comparison's literal reaches the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Rendered inline, already quoted
    Inline(String),
    /// Bound as a parameter
    Bound,
}

/// A compiled predicate node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `"table"."field" <op> literal`
    Comparison {
        table: &'static str,
        field: &'static str,
        op: Operator,
        value: Value,
        literal: Literal,
    },
    /// `"table"."field" IS [NOT] NULL`
    NullCheck {
        table: &'static str,
        field: &'static str,
        negated: bool,
    },
    /// `left AND|OR right`
    Combinator {
        left: Box<Condition>,
        logic: Logic,
        right: Box<Condition>,
    },
}

impl Condition {
    /// Combine with AND.
    pub fn and(self, other: Condition) -> Self {
        Condition::Combinator {
            left: Box::new(self),
            logic: Logic::And,
            right: Box::new(other),
        }
    }

    /// Combine with OR.
    pub fn or(self, other: Condition) -> Self {
        Condition::Combinator {
            left: Box::new(self),
            logic: Logic::Or,
            right: Box::new(other),
        }
    }

    /// Render to SQL with `?` markers for bound literals.
    ///
    /// A combinator nested under another combinator is parenthesized; the
    /// root and leaves never are.
    pub fn render(&self, dialect: Dialect) -> Fragment {
        let mut out = Fragment::new();
        self.render_into(dialect, &mut out);
        out
    }

    fn render_into(&self, dialect: Dialect, out: &mut Fragment) {
        match self {
            Condition::Comparison {
                table,
                field,
                op,
                value,
                literal,
            } => {
                out.push_str(&dialect.qualify(table, field));
                out.push_str(" ");
                out.push_str(op.as_sql());
                out.push_str(" ");
                match literal {
                    Literal::Inline(sql) => out.push_str(sql),
                    Literal::Bound => out.push_param(value.clone()),
                }
            }
            Condition::NullCheck {
                table,
                field,
                negated,
            } => {
                out.push_str(&dialect.qualify(table, field));
                out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Combinator { left, logic, right } => {
                left.render_operand(dialect, out);
                out.push_str(" ");
                out.push_str(logic.as_sql());
                out.push_str(" ");
                right.render_operand(dialect, out);
            }
        }
    }

    fn render_operand(&self, dialect: Dialect, out: &mut Fragment) {
        if matches!(self, Condition::Combinator { .. }) {
            out.push_str("(");
            self.render_into(dialect, out);
            out.push_str(")");
        } else {
            self.render_into(dialect, out);
        }
    }

    /// Evaluate against a model's current values.
    ///
    /// Comparisons against a NULL current value are false. Both sides of a
    /// combinator are always evaluated, left first.
    pub fn evaluate(&self, model: &ModelInstance) -> bool {
        match self {
            Condition::Comparison {
                field, op, value, ..
            } => match model.get(field) {
                Some(current) if !current.is_null() => current
                    .compare(value)
                    .is_some_and(|ordering| op.holds(ordering)),
                _ => false,
            },
            Condition::NullCheck { field, negated, .. } => {
                let is_null = model.get(field).is_none_or(Value::is_null);
                is_null != *negated
            }
            Condition::Combinator { left, logic, right } => {
                let l = left.evaluate(model);
                let r = right.evaluate(model);
                match logic {
                    Logic::And => l && r,
                    Logic::Or => l || r,
                }
            }
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Condition::Combinator { left, right, .. } => left.leaf_count() + right.leaf_count(),
            _ => 1,
        }
    }
}

/// Inline SQL text for a literal, or `None` when it has to be bound.
pub fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("NULL".to_string()),
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::BigInt(v) => Some(v.to_string()),
        Value::Text(_) | Value::Date(_) | Value::Timestamp(_) => {
            Some(format!("'{}'", value.to_plain_string().replace('\'', "''")))
        }
        Value::Json(_) => None,
    }
}
