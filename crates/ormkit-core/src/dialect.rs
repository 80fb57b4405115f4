//! SQL dialects.
//!
//! A dialect decides how identifiers are quoted, which bind marker a
//! parameter gets and how one-to-many rows are folded into a JSON document.

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
    /// Named-parameter dialect (uses @p0, @p1 placeholders)
    Named,
}

/// One projected column inside an aggregated JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonColumn {
    /// Key inside each JSON object (`"Table.field"`)
    pub key: String,
    /// Qualified, quoted column expression
    pub expr: String,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
            Dialect::Named => format!("@p{}", index.saturating_sub(1)),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite | Dialect::Named => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Qualified column reference, `"Table"."column"`.
    pub fn qualify(self, table: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Quote a string literal, doubling embedded single quotes.
    pub fn quote_literal(self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Whether enum values need an explicit cast to their named type.
    pub const fn casts_enums(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Render an enum literal for INSERT/UPDATE, cast to `"table_field"` where
    /// the dialect stores enums as named types.
    pub fn enum_literal(self, table: &str, field: &str, variant: &str) -> String {
        let literal = self.quote_literal(variant);
        if self.casts_enums() {
            format!("{}::{}", literal, self.quote_identifier(&format!("{table}_{field}")))
        } else {
            literal
        }
    }

    /// Aggregate the joined child rows of one parent into a JSON array of
    /// objects, yielding `[]` when the join produced no child.
    ///
    /// `present` is the qualified primary-key column of the child; rows where
    /// it is NULL are the LEFT JOIN's "no match" rows and are filtered out.
    pub fn json_aggregate(self, columns: &[JsonColumn], present: &str) -> String {
        match self {
            Dialect::Postgres => format!(
                "COALESCE(jsonb_agg(jsonb_build_object({})) FILTER (WHERE {} IS NOT NULL), '[]'::jsonb)",
                self.json_pairs(columns),
                present
            ),
            Dialect::Sqlite => format!(
                "COALESCE(json_group_array(json_object({})) FILTER (WHERE {} IS NOT NULL), '[]')",
                self.json_pairs(columns),
                present
            ),
            Dialect::Mysql | Dialect::Named => format!(
                "CASE WHEN COUNT({}) = 0 THEN JSON_ARRAY() ELSE JSON_ARRAYAGG(JSON_OBJECT({})) END",
                present,
                self.json_pairs(columns)
            ),
        }
    }

    fn json_pairs(self, columns: &[JsonColumn]) -> String {
        columns
            .iter()
            .map(|c| format!("{}, {}", self.quote_literal(&c.key), c.expr))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Replace every `?` bind marker outside quoted text with this dialect's
    /// placeholder. Returns the rewritten SQL and the number of markers seen.
    pub fn substitute_markers(self, sql: &str) -> (String, usize) {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut count = 0usize;
        let mut quote: Option<char> = None;

        for ch in sql.chars() {
            match quote {
                Some(q) => {
                    // a doubled quote closes and reopens, which nets out the same
                    if ch == q {
                        quote = None;
                    }
                    out.push(ch);
                }
                None => match ch {
                    '\'' | '"' | '`' => {
                        quote = Some(ch);
                        out.push(ch);
                    }
                    '?' => {
                        count += 1;
                        out.push_str(&self.placeholder(count));
                    }
                    _ => out.push(ch),
                },
            }
        }

        (out, count)
    }
}
