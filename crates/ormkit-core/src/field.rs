//! Field descriptors.
//!
//! A field is described once, at registry bootstrap, by a [`FieldInfo`]
//! whose [`FieldKind`] decides its SQL type, how literals are coerced and
//! which rule the validator applies.

use crate::error::{FieldValidationError, ValidationErrorKind};
use crate::value::{Value, parse_date, parse_timestamp};

/// Default character pool for generated identifiers.
pub const ID_POOL: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Referential action applied to cached dependents when a referenced row
/// is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - dependents are left as they are.
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION for the cache.
    Restrict,
    /// Cascade - dependents are removed as well.
    Cascade,
    /// Set null - the owning field of each dependent becomes NULL.
    SetNull,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// The closed set of field validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed-length identifier drawn from a character pool
    Id { length: usize, pool: &'static str },
    /// Free text with length bounds and an optional regex
    Text {
        min: usize,
        max: usize,
        pattern: Option<&'static str>,
    },
    /// E-mail address
    Email { min: usize, max: usize },
    /// Bounded integer
    Integer { min: i64, max: i64 },
    Boolean,
    /// One of a fixed list of variant names
    Enum {
        type_name: &'static str,
        variants: &'static [&'static str],
    },
    /// Calendar date, `yyyy-MM-dd`
    Date,
    /// Date and time without zone, `yyyy-MM-dd HH:mm:ss`
    Timestamp,
}

impl FieldKind {
    /// Whether `<`, `<=`, `>` and `>=` are meaningful for this kind.
    pub const fn is_ordered(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer { .. } | FieldKind::Date | FieldKind::Timestamp
        )
    }

    /// Short label used in type-mismatch messages.
    pub const fn label(&self) -> &'static str {
        match self {
            FieldKind::Id { .. } | FieldKind::Text { .. } | FieldKind::Email { .. } => "text",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Date => "date",
            FieldKind::Timestamp => "timestamp",
        }
    }

    /// `Value is not a {label}` with the right article.
    pub fn mismatch_message(&self) -> String {
        let label = self.label();
        let article = if label.starts_with(['a', 'e', 'i', 'o', 'u']) {
            "an"
        } else {
            "a"
        };
        format!("Value is not {article} {label}")
    }
}

/// Metadata about a model field/column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field and column name
    pub name: &'static str,
    /// Validator and value family
    pub kind: FieldKind,
    /// Whether a value must be present (default `true`)
    pub required: bool,
    /// Whether this field is (part of) the primary key
    pub primary_key: bool,
    /// Whether this field has a unique constraint
    pub unique: bool,
    /// Full-text search weight (`'A'` to `'D'`), if indexed for search
    pub search_weight: Option<char>,
    /// Whether literals for this field may be inlined into SQL text
    pub embeddable: bool,
}

impl FieldInfo {
    /// Create a field of the given kind with the kind's default embeddability.
    pub const fn new(name: &'static str, kind: FieldKind, embeddable: bool) -> Self {
        Self {
            name,
            kind,
            required: true,
            primary_key: false,
            unique: false,
            search_weight: None,
            embeddable,
        }
    }

    /// Ten character identifier over `A-Z0-9`.
    pub const fn id(name: &'static str) -> Self {
        Self::id_with(name, 10, ID_POOL)
    }

    /// Identifier with a custom length and pool.
    pub const fn id_with(name: &'static str, length: usize, pool: &'static str) -> Self {
        Self::new(name, FieldKind::Id { length, pool }, true)
    }

    /// Five character identifier.
    pub const fn short_id(name: &'static str) -> Self {
        Self::id_with(name, 5, ID_POOL)
    }

    pub const fn text(name: &'static str, min: usize, max: usize) -> Self {
        Self::new(
            name,
            FieldKind::Text {
                min,
                max,
                pattern: None,
            },
            false,
        )
    }

    /// Personal or display name, 1 to 50 characters.
    pub const fn name(name: &'static str) -> Self {
        Self::text(name, 1, 50)
    }

    pub const fn email(name: &'static str) -> Self {
        Self::new(name, FieldKind::Email { min: 5, max: 255 }, false)
    }

    pub const fn phone(name: &'static str) -> Self {
        Self::patterned(name, 7, 20, r"^[\+0-9 \-]+$", true)
    }

    /// Salted hash string such as a session token.
    pub const fn hash(name: &'static str) -> Self {
        Self::patterned(name, 1, 255, r"^s[0-9a-f]+$", true)
    }

    pub const fn slug(name: &'static str) -> Self {
        Self::patterned(name, 3, 255, r"^[a-z0-9\-]+$", false)
    }

    pub const fn hex_color(name: &'static str) -> Self {
        Self::patterned(name, 6, 6, r"^[0-9A-Fa-f]+$", false)
    }

    pub const fn postcode(name: &'static str) -> Self {
        Self::patterned(name, 1, 15, r"^[0-9A-Z ]+$", true)
    }

    const fn patterned(
        name: &'static str,
        min: usize,
        max: usize,
        pattern: &'static str,
        embeddable: bool,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Text {
                min,
                max,
                pattern: Some(pattern),
            },
            embeddable,
        )
    }

    pub const fn int(name: &'static str, min: i64, max: i64) -> Self {
        Self::new(name, FieldKind::Integer { min, max }, true)
    }

    /// Amount in minor currency units.
    pub const fn price(name: &'static str) -> Self {
        Self::int(name, 0, 999_999_999)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, true)
    }

    pub const fn enumeration(
        name: &'static str,
        type_name: &'static str,
        variants: &'static [&'static str],
    ) -> Self {
        Self::new(
            name,
            FieldKind::Enum {
                type_name,
                variants,
            },
            true,
        )
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date, true)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldKind::Timestamp, true)
    }

    /// Mark this field as (part of) the primary key.
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark this field as unique.
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Allow NULL / unset values.
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Include this field in the full-text index with the given weight.
    pub const fn search(mut self, weight: char) -> Self {
        self.search_weight = Some(weight);
        self
    }

    /// Override whether literals for this field are inlined.
    pub const fn embeddable(mut self, embeddable: bool) -> Self {
        self.embeddable = embeddable;
        self
    }

    /// Whether this field is an enum.
    pub const fn is_enum(&self) -> bool {
        matches!(self.kind, FieldKind::Enum { .. })
    }

    /// Column type used in DDL.
    pub fn sql_type(&self) -> String {
        match &self.kind {
            FieldKind::Id { length, .. } => format!("VARCHAR({length})"),
            FieldKind::Text { max, .. } | FieldKind::Email { max, .. } => {
                format!("VARCHAR({max})")
            }
            FieldKind::Integer { min, max } => {
                if *min >= i64::from(i16::MIN) && *max <= i64::from(i16::MAX) {
                    "SMALLINT".to_string()
                } else if *min >= i64::from(i32::MIN) && *max <= i64::from(i32::MAX) {
                    "INT".to_string()
                } else {
                    "BIGINT".to_string()
                }
            }
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Enum { variants, .. } => format!(
                "ENUM ({})",
                variants
                    .iter()
                    .map(|v| format!("'{v}'"))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Timestamp => "TIMESTAMP(0)".to_string(),
        }
    }

    /// Convert a caller or backend value into this field's canonical value.
    ///
    /// NULL passes through untouched; null rules are applied by the validator.
    pub fn coerce(&self, value: Value) -> Result<Value, FieldValidationError> {
        let coerced = match (&self.kind, value) {
            (_, Value::Null) => Some(Value::Null),
            (
                FieldKind::Id { .. }
                | FieldKind::Text { .. }
                | FieldKind::Email { .. }
                | FieldKind::Enum { .. },
                Value::Text(s),
            ) => Some(Value::Text(s)),
            (FieldKind::Integer { .. }, Value::Int(v)) => Some(Value::BigInt(i64::from(v))),
            (FieldKind::Integer { .. }, Value::BigInt(v)) => Some(Value::BigInt(v)),
            (FieldKind::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (FieldKind::Boolean, Value::Int(v)) => Some(Value::Bool(v != 0)),
            (FieldKind::Boolean, Value::BigInt(v)) => Some(Value::Bool(v != 0)),
            (FieldKind::Date, Value::Date(d)) => Some(Value::Date(d)),
            (FieldKind::Date, Value::Text(s)) => {
                return parse_date(&s).map(Value::Date).ok_or_else(|| self.format_error(&s));
            }
            (FieldKind::Timestamp, Value::Timestamp(t)) => Some(Value::Timestamp(t)),
            (FieldKind::Timestamp, Value::Date(d)) => {
                Some(Value::Timestamp(crate::value::date_to_micros(d)))
            }
            (FieldKind::Timestamp, Value::Text(s)) => {
                return parse_timestamp(&s)
                    .map(Value::Timestamp)
                    .ok_or_else(|| self.format_error(&s));
            }
            _ => None,
        };

        coerced.ok_or_else(|| FieldValidationError {
            field: self.name.to_string(),
            kind: ValidationErrorKind::Type,
            message: self.kind.mismatch_message(),
        })
    }

    fn format_error(&self, text: &str) -> FieldValidationError {
        FieldValidationError {
            field: self.name.to_string(),
            kind: ValidationErrorKind::Format,
            message: format!("Value '{}' is not a valid {}", text, self.kind.label()),
        }
    }
}
