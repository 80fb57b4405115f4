//! Predicate DSL.
//!
//! Predicates name fields by string and carry raw literals; nothing is
//! checked until [`compile`](crate::compiler::compile) resolves them
//! against a model.
//!
//! ```ignore
//! let p = col("Name").eq("Fred").or(col("Name").eq("George"));
//! let p = col("Credit").gt(1023) & col("Verified").eq(true);
//! ```

use std::ops::{BitAnd, BitOr};

use ormkit_core::Value;

use crate::condition::{Logic, Operator};

/// Reference to a field of the model being queried.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
}

/// Start a predicate on the named field.
pub fn col(name: impl Into<String>) -> Column {
    Column { name: name.into() }
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(self, op: Operator, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: self.name,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Ge, value)
    }

    /// Same as `eq(Value::Null)`.
    pub fn is_null(self) -> Predicate {
        self.compare(Operator::Eq, Value::Null)
    }

    /// Same as `ne(Value::Null)`.
    pub fn is_not_null(self) -> Predicate {
        self.compare(Operator::Ne, Value::Null)
    }
}

/// An uncompiled boolean predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    Combine {
        left: Box<Predicate>,
        logic: Logic,
        right: Box<Predicate>,
    },
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Self {
        Predicate::Combine {
            left: Box::new(self),
            logic: Logic::And,
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Combine {
            left: Box::new(self),
            logic: Logic::Or,
            right: Box::new(other),
        }
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}
