//! ORDER BY clause.

use ormkit_core::Dialect;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term on a qualified column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    table: String,
    column: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        direction: OrderDirection,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            direction,
        }
    }

    /// Create an ascending order by clause.
    pub fn asc(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(table, column, OrderDirection::Asc)
    }

    /// Create a descending order by clause.
    pub fn desc(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(table, column, OrderDirection::Desc)
    }

    /// Generate SQL for this ORDER BY term.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = dialect.qualify(&self.table, &self.column);
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        sql
    }
}
