//! SELECT query builder.

use ormkit_core::error::ConsistencyErrorKind;
use ormkit_core::{Dialect, Error, Result};

use crate::clause::OrderBy;
use crate::condition::Condition;
use crate::fragment::Fragment;
use crate::join::Join;

/// One projected expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// `"table"."column" as "label"`
    Column {
        table: String,
        column: String,
        label: String,
        /// Enum columns are read as text where the dialect stores named types
        is_enum: bool,
    },
    /// Pre-rendered expression, `expr AS "label"`
    Expr { sql: String, label: String },
}

impl SelectItem {
    /// Column labelled `"table.column"`.
    pub fn column(table: impl Into<String>, column: impl Into<String>, is_enum: bool) -> Self {
        let table = table.into();
        let column = column.into();
        let label = format!("{table}.{column}");
        SelectItem::Column {
            table,
            column,
            label,
            is_enum,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            SelectItem::Column {
                table,
                column,
                label,
                is_enum,
            } => {
                let cast = if *is_enum && dialect.casts_enums() {
                    "::text"
                } else {
                    ""
                };
                format!(
                    "{}{} as {}",
                    dialect.qualify(table, column),
                    cast,
                    dialect.quote_identifier(label)
                )
            }
            SelectItem::Expr { sql, label } => {
                format!("{} AS {}", sql, dialect.quote_identifier(label))
            }
        }
    }
}

/// What a SELECT returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    #[default]
    All,
    /// `COUNT(*)`
    Count,
    Items(Vec<SelectItem>),
}

/// A SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    projection: Projection,
    tables: Vec<String>,
    joins: Vec<Join>,
    filter: Option<Condition>,
    /// Qualified (table, column) pairs
    group_by: Vec<(String, String)>,
    order_by: Vec<OrderBy>,
    limit: u64,
    offset: u64,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select from `table`; repeated calls produce `FROM "a", "b"`.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn count(self) -> Self {
        self.projection(Projection::Count)
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, condition: Option<Condition>) -> Self {
        self.filter = condition;
        self
    }

    pub fn group_by(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.group_by.push((table.into(), column.into()));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Maximum number of rows; 0 means unlimited.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Rows to skip; 0 means none.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Render the statement with `?` markers.
    pub fn build(&self, dialect: Dialect) -> Result<Fragment> {
        if self.tables.is_empty() {
            return Err(Error::consistency(
                ConsistencyErrorKind::NoTable,
                "No table has been specified for the query.",
            ));
        }

        // SELECT
        let mut out = Fragment::raw("SELECT ");
        match &self.projection {
            Projection::All => out.push_str("*"),
            Projection::Count => out.push_str("COUNT(*)"),
            Projection::Items(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_sql(dialect)).collect();
                out.push_str(&items.join(", "));
            }
        }

        // FROM
        out.push_str(" FROM ");
        let tables: Vec<String> = self
            .tables
            .iter()
            .map(|t| dialect.quote_identifier(t))
            .collect();
        out.push_str(&tables.join(", "));

        // JOINs
        for join in &self.joins {
            out.push_str(" ");
            out.push_str(&join.to_sql(dialect));
        }

        // WHERE
        if let Some(filter) = &self.filter {
            out.push_str(" WHERE ");
            out.append(filter.render(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            let columns: Vec<String> = self
                .group_by
                .iter()
                .map(|(t, c)| dialect.qualify(t, c))
                .collect();
            out.push_str(" GROUP BY ");
            out.push_str(&columns.join(", "));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(|o| o.to_sql(dialect)).collect();
            out.push_str(" ORDER BY ");
            out.push_str(&terms.join(", "));
        }

        // LIMIT / OFFSET
        if self.limit > 0 {
            out.push_str(&format!(" LIMIT {}", self.limit));
        } else if self.offset > 0 {
            // SQLite and MySQL accept OFFSET only after a LIMIT
            match dialect {
                Dialect::Sqlite => out.push_str(" LIMIT -1"),
                Dialect::Mysql => out.push_str(" LIMIT 18446744073709551615"),
                Dialect::Postgres | Dialect::Named => {}
            }
        }
        if self.offset > 0 {
            out.push_str(&format!(" OFFSET {}", self.offset));
        }

        Ok(out)
    }
}
