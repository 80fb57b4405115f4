//! JOIN clause types.

use ormkit_core::Dialect;

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// A JOIN on column equality: `<type> "table" ["alias"] ON "l"."c" = "r"."c"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// Optional table alias
    pub alias: Option<String>,
    /// Table (or alias) and column on the already-joined side
    pub left: (String, String),
    /// Column on the joined table
    pub right_column: String,
}

impl Join {
    /// Create a LEFT JOIN of `table` where `left_table.left_column = table.right_column`.
    pub fn left(
        table: impl Into<String>,
        left_table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: None,
            left: (left_table.into(), left_column.into()),
            right_column: right_column.into(),
        }
    }

    /// Set an alias for the joined table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name the joined table is referenced by.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Generate SQL for this JOIN.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!(
            "{} {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table)
        );
        if let Some(alias) = &self.alias {
            sql.push(' ');
            sql.push_str(&dialect.quote_identifier(alias));
        }
        sql.push_str(" ON ");
        sql.push_str(&dialect.qualify(&self.left.0, &self.left.1));
        sql.push_str(" = ");
        sql.push_str(&dialect.qualify(self.reference(), &self.right_column));
        sql
    }
}
