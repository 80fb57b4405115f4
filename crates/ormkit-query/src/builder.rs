//! Query builders for INSERT, UPDATE, DELETE operations.

use ormkit_core::error::ConsistencyErrorKind;
use ormkit_core::{Dialect, Error, Result, Value};

use crate::condition::Condition;
use crate::fragment::Fragment;

/// A column and the value written to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: &'static str,
    pub value: Value,
    /// Enum values are cast to their named type where the dialect needs it
    pub is_enum: bool,
}

impl Assignment {
    pub fn new(column: &'static str, value: Value, is_enum: bool) -> Self {
        Self {
            column,
            value,
            is_enum,
        }
    }

    /// Append the value: inline enum cast, `NULL`, or a bound marker.
    fn push_value(&self, table: &str, dialect: Dialect, out: &mut Fragment) {
        match &self.value {
            Value::Null => out.push_str("NULL"),
            Value::Text(variant) if self.is_enum && dialect.casts_enums() => {
                out.push_str(&dialect.enum_literal(table, self.column, variant));
            }
            value => out.push_param(value.clone()),
        }
    }
}

fn require_table(table: &str) -> Result<()> {
    if table.is_empty() {
        return Err(Error::consistency(
            ConsistencyErrorKind::NoTable,
            "No table has been specified for the query.",
        ));
    }
    Ok(())
}

/// INSERT query builder.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<Assignment>,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, assignment: Assignment) -> Self {
        self.values.push(assignment);
        self
    }

    /// `INSERT INTO "t" ("a", "b") VALUES (?, ?)`
    pub fn build(&self, dialect: Dialect) -> Result<Fragment> {
        require_table(&self.table)?;
        if self.values.is_empty() {
            return Err(Error::consistency(
                ConsistencyErrorKind::NoColumns,
                "No fields have been set for insertion.",
            ));
        }

        let columns: Vec<String> = self
            .values
            .iter()
            .map(|a| dialect.quote_identifier(a.column))
            .collect();
        let mut out = Fragment::raw(format!(
            "INSERT INTO {} ({}) VALUES (",
            dialect.quote_identifier(&self.table),
            columns.join(", ")
        ));
        for (i, assignment) in self.values.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            assignment.push_value(&self.table, dialect, &mut out);
        }
        out.push_str(")");
        Ok(out)
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set: Vec<Assignment>,
    filter: Option<Condition>,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            filter: None,
        }
    }

    pub fn set(mut self, assignment: Assignment) -> Self {
        self.set.push(assignment);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    /// `UPDATE "t" SET "c" = ?, ... WHERE cond`
    pub fn build(&self, dialect: Dialect) -> Result<Fragment> {
        require_table(&self.table)?;
        if self.set.is_empty() {
            return Err(Error::consistency(
                ConsistencyErrorKind::NoAssignments,
                "No fields have been set for update.",
            ));
        }

        let mut out = Fragment::raw(format!(
            "UPDATE {} SET ",
            dialect.quote_identifier(&self.table)
        ));
        for (i, assignment) in self.set.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&dialect.quote_identifier(assignment.column));
            out.push_str(" = ");
            assignment.push_value(&self.table, dialect, &mut out);
        }
        if let Some(filter) = &self.filter {
            out.push_str(" WHERE ");
            out.append(filter.render(dialect));
        }
        Ok(out)
    }
}

/// DELETE query builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    filter: Option<Condition>,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    /// `DELETE FROM "t" WHERE cond`
    pub fn build(&self, dialect: Dialect) -> Result<Fragment> {
        require_table(&self.table)?;
        let mut out = Fragment::raw(format!(
            "DELETE FROM {}",
            dialect.quote_identifier(&self.table)
        ));
        if let Some(filter) = &self.filter {
            out.push_str(" WHERE ");
            out.append(filter.render(dialect));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Literal, Operator};

    fn by_id() -> Condition {
        Condition::Comparison {
            table: "User",
            field: "ID",
            op: Operator::Eq,
            value: Value::from("AAAAAAAAAA"),
            literal: Literal::Inline("'AAAAAAAAAA'".to_string()),
        }
    }

    #[test]
    fn test_insert() {
        let f = InsertBuilder::new("User")
            .value(Assignment::new("ID", Value::from("AAAAAAAAAA"), false))
            .value(Assignment::new("Name", Value::from("John"), false))
            .build(Dialect::Sqlite)
            .unwrap();
        assert_eq!(f.sql(), "INSERT INTO \"User\" (\"ID\", \"Name\") VALUES (?, ?)");
        assert_eq!(f.params().len(), 2);
    }

    #[test]
    fn test_insert_casts_enums_on_postgres() {
        let builder = InsertBuilder::new("User")
            .value(Assignment::new("Rank", Value::from("Admin"), true));
        assert_eq!(
            builder.build(Dialect::Postgres).unwrap().sql(),
            "INSERT INTO \"User\" (\"Rank\") VALUES ('Admin'::\"User_Rank\")"
        );
        let sqlite = builder.build(Dialect::Sqlite).unwrap();
        assert_eq!(sqlite.sql(), "INSERT INTO \"User\" (\"Rank\") VALUES (?)");
        assert_eq!(sqlite.params(), &[Value::from("Admin")]);
    }

    #[test]
    fn test_insert_without_columns_fails() {
        let err = InsertBuilder::new("User").build(Dialect::Postgres).unwrap_err();
        assert_eq!(err.to_string(), "No fields have been set for insertion.");
    }

    #[test]
    fn test_update_with_null_and_filter() {
        let f = UpdateBuilder::new("User")
            .set(Assignment::new("Name", Value::from("Fred"), false))
            .set(Assignment::new("Session", Value::Null, false))
            .filter(by_id())
            .build(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            f.sql(),
            "UPDATE \"User\" SET \"Name\" = ?, \"Session\" = NULL WHERE \"User\".\"ID\" = 'AAAAAAAAAA'"
        );
        assert_eq!(f.params(), &[Value::from("Fred")]);
    }

    #[test]
    fn test_update_without_set_fails() {
        let err = UpdateBuilder::new("User").build(Dialect::Postgres).unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ref e) if e.kind == ConsistencyErrorKind::NoAssignments
        ));
    }

    #[test]
    fn test_delete() {
        let f = DeleteBuilder::new("User").filter(by_id()).build(Dialect::Sqlite).unwrap();
        assert_eq!(
            f.sql(),
            "DELETE FROM \"User\" WHERE \"User\".\"ID\" = 'AAAAAAAAAA'"
        );
        let err = DeleteBuilder::new("").build(Dialect::Sqlite).unwrap_err();
        assert!(err.is_consistency());
    }
}
